//! 由命令行模块的 XML 描述生成 Python 流水线包装类.
//!
//! 每个模块以 `<launcher...> <module> --xml` 取得描述, 渲染为
//! `<Module>InputSpec`, `<Module>OutputSpec` 与主类三段源码,
//! 再按模块分类 (`category`) 组织成包并写盘.
//!
//! ```no_run
//! use std::path::Path;
//! use chest_berry::codegen::{generate_all_classes, grab_xml};
//!
//! # fn run() -> Result<(), chest_berry::codegen::CodegenError> {
//! let modules = ["GenerateDistanceMapFromLabelMap".to_string()];
//! let launcher: Vec<String> = Vec::new();
//! generate_all_classes(&modules, &launcher, Some("cip"), Path::new("out"), |m| {
//!     grab_xml(m, &launcher)
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod descriptor;
pub mod render;
pub mod tree;

use std::path::Path;
use std::process::Command;

pub use descriptor::{parse_descriptor, to_python_identifier, ModuleDescriptor, Parameter};
pub use render::render_class;
pub use tree::{CodeNode, PackageTree};

/// 代码生成错误.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// XML 无法解析.
    #[error("malformed module xml: {0}")]
    Xml(#[from] roxmltree::Error),

    /// 文件写入失败.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// 描述中缺少 `category`.
    #[error("module description has no category")]
    MissingCategory,

    /// 参数既无 `longflag` 也无 `name`.
    #[error("parameter has neither longflag nor name")]
    MissingName,

    /// `index` 不是整数.
    #[error("invalid parameter index `{0}`")]
    InvalidIndex(String),

    /// 不支持的参数类型.
    #[error("unsupported parameter type `{0}`")]
    UnknownParameterType(String),

    /// 文件类参数缺少 `channel`.
    #[error(
        "insufficient xml specification: parameter `{parameter}` of type 'file', 'directory', \
         'image', 'geometry', 'transform' or 'table' requires a 'channel' field"
    )]
    MissingChannel {
        /// 参数名.
        parameter: String,
    },

    /// `channel` 不是 `input`/`output`.
    #[error("parameter `{parameter}` has channel `{channel}`, expected 'input' or 'output'")]
    InvalidChannel {
        /// 参数名.
        parameter: String,
        /// 实际值.
        channel: String,
    },

    /// 无法启动模块程序.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        /// 命令行.
        command: String,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 模块程序以非零状态退出.
    #[error("`{command}` exited with non-zero status (code {code:?})")]
    CommandFailed {
        /// 命令行.
        command: String,
        /// 退出码.
        code: Option<i32>,
    },

    /// 模块输出不是 UTF-8.
    #[error("module xml is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// 运行 `<launcher...> <module> --xml` 并返回其标准输出.
pub fn grab_xml(module: &str, launcher: &[String]) -> Result<String, CodegenError> {
    let mut argv: Vec<&str> = launcher.iter().map(String::as_str).collect();
    argv.extend([module, "--xml"]);
    let command = argv.join(" ");

    let output = Command::new(argv[0])
        .args(&argv[1..])
        .output()
        .map_err(|source| CodegenError::Launch {
            command: command.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(CodegenError::CommandFailed {
            command,
            code: output.status.code(),
        });
    }
    Ok(String::from_utf8(output.stdout)?)
}

/// 一个模块的生成结果.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedClass {
    /// 模块分类.
    pub category: String,
    /// 类源码.
    pub code: String,
}

/// 由 XML 文本生成模块 `module` 的类源码.
pub fn generate_class(module: &str, xml: &str, launcher: &[String]) -> Result<GeneratedClass, CodegenError> {
    let descriptor = parse_descriptor(xml)?;
    let code = render_class(module, &descriptor, launcher)?;
    Ok(GeneratedClass {
        category: descriptor.category,
        code,
    })
}

/// 分类的点分路径. 只取第一个空白之前的部分.
pub fn category_path(category: &str) -> Vec<&str> {
    category
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .split('.')
        .collect()
}

/// 为所有模块生成包装类, 写入 `out_dir`.
///
/// 模块 `m` 的类放在其分类路径除最后一段外的命名空间下, 再套一层名为
/// `module_name` 的命名空间; `module_name` 为 `None` 时取分类路径的最后一段.
/// `fetch` 负责取得模块的 XML 描述, 通常为 [`grab_xml`].
pub fn generate_all_classes<F>(
    modules: &[String],
    launcher: &[String],
    module_name: Option<&str>,
    out_dir: &Path,
    mut fetch: F,
) -> Result<PackageTree, CodegenError>
where
    F: FnMut(&str) -> Result<String, CodegenError>,
{
    let mut tree = PackageTree::new();
    for module in modules {
        log::info!("generating definition for module {module}");
        let xml = fetch(module)?;
        let generated = generate_class(module, &xml, launcher)?;

        let mut namespaces = category_path(&generated.category);
        let last = namespaces.pop().unwrap_or_default();
        namespaces.push(module_name.unwrap_or(last));
        tree.insert(&namespaces, module, generated.code);
    }
    tree.write(out_dir)?;
    log::info!("wrote {} modules to {}", modules.len(), out_dir.display());
    Ok(tree)
}
