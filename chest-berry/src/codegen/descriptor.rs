//! 命令行模块 XML 描述的解析.
//!
//! 描述文件采用 SlicerExecutionModel 格式: 根元素下是模块说明 (`title`,
//! `category`, ...), 以及若干 `parameters` 分组, 每组的子元素即参数,
//! 元素名为参数类型 (`image`, `integer-vector`, `string-enumeration` 等).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use roxmltree::{Document, Node};

use super::CodegenError;

/// 生成的类文档中依次出现的模块说明字段.
pub const DOC_FIELDS: [&str; 8] = [
    "title",
    "category",
    "description",
    "version",
    "documentation-url",
    "license",
    "contributor",
    "acknowledgements",
];

/// Python 关键字. 同名参数需要改名.
static PYTHON_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
        "continue", "def", "del", "elif", "else", "except", "exec", "finally", "for", "from",
        "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "print",
        "raise", "return", "try", "while", "with", "yield",
    ]
    .into_iter()
    .collect()
});

/// 把参数名转为合法的 Python 变量名: 去掉首尾空白, 关键字加 `opt_` 前缀.
pub fn to_python_identifier(name: &str) -> String {
    if PYTHON_KEYWORDS.contains(name) {
        format!("opt_{name}")
    } else {
        name.trim().to_owned()
    }
}

/// 参数的 I/O 方向.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Channel {
    /// 输入.
    Input,
    /// 输出.
    Output,
}

/// 一个参数.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameter {
    /// 参数类型, 即 XML 元素名.
    pub kind: String,
    /// `name` 字段.
    pub name: Option<String>,
    /// `longflag` 字段, 原样保存.
    pub longflag: Option<String>,
    /// 位置参数的下标.
    pub index: Option<i64>,
    /// 说明.
    pub description: Option<String>,
    /// `channel` 字段, 原样保存.
    pub channel: Option<String>,
    /// `multiple="true"`.
    pub multiple: bool,
    /// 枚举值.
    pub elements: Vec<String>,
    /// `fileExtensions` 属性.
    pub file_extensions: Option<String>,
}

impl Parameter {
    /// 类型是否为文件类 (需要 `channel`).
    pub fn is_file_like(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "file" | "directory" | "image" | "geometry" | "transform" | "table"
        )
    }

    /// 解析后的 `channel`.
    pub fn channel(&self) -> Option<Channel> {
        match self.channel.as_deref().map(str::trim) {
            Some("input") => Some(Channel::Input),
            Some("output") => Some(Channel::Output),
            _ => None,
        }
    }

    /// 去掉前缀 `-` 与空白后的长选项名.
    pub fn longflag_name(&self) -> Option<&str> {
        self.longflag
            .as_deref()
            .map(|f| f.trim_start_matches(|c: char| c == ' ' || c == '-').trim_end_matches(' '))
    }
}

/// 一个 `parameters` 分组.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterGroup {
    /// 组内最大的位置下标, 没有位置参数时为 0.
    pub max_index: i64,
    /// 参数, 按文档顺序.
    pub parameters: Vec<Parameter>,
}

/// 模块描述.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleDescriptor {
    /// 存在的说明字段, 按 [`DOC_FIELDS`] 顺序.
    pub docs: Vec<(&'static str, String)>,
    /// 分类, 如 `Chest Imaging Platform.Toolkit`.
    pub category: String,
    /// 参数分组.
    pub groups: Vec<ParameterGroup>,
}

fn first_descendant<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.descendants().skip(1).find(|n| n.has_tag_name(tag))
}

fn first_text(node: Node, tag: &str) -> Option<String> {
    first_descendant(node, tag).and_then(|n| n.text()).map(str::to_owned)
}

fn parse_parameter(node: Node) -> Result<Parameter, CodegenError> {
    let index = match first_text(node, "index") {
        Some(t) => Some(
            t.trim()
                .parse()
                .map_err(|_| CodegenError::InvalidIndex(t.clone()))?,
        ),
        None => None,
    };
    Ok(Parameter {
        kind: node.tag_name().name().to_owned(),
        name: first_text(node, "name"),
        longflag: first_text(node, "longflag"),
        index,
        description: first_text(node, "description"),
        channel: first_text(node, "channel"),
        multiple: node.attribute("multiple") == Some("true"),
        elements: node
            .descendants()
            .filter(|n| n.has_tag_name("element"))
            .filter_map(|n| n.text().map(str::to_owned))
            .collect(),
        file_extensions: node.attribute("fileExtensions").map(str::to_owned),
    })
}

/// 解析 XML 文本.
pub fn parse_descriptor(xml: &str) -> Result<ModuleDescriptor, CodegenError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();

    let docs = DOC_FIELDS
        .iter()
        .filter_map(|&field| first_text(doc.root(), field).map(|text| (field, text)))
        .collect::<Vec<_>>();
    let category = docs
        .iter()
        .find(|(field, _)| *field == "category")
        .map(|(_, text)| text.clone())
        .ok_or(CodegenError::MissingCategory)?;

    let mut groups = Vec::new();
    for group in root.descendants().filter(|n| n.has_tag_name("parameters")) {
        let max_index = group
            .descendants()
            .filter(|n| n.has_tag_name("index"))
            .filter_map(|n| n.text().and_then(|t| t.trim().parse::<i64>().ok()))
            .fold(0, i64::max);
        let parameters = group
            .children()
            .filter(|n| n.is_element())
            .filter(|n| !matches!(n.tag_name().name(), "label" | "description"))
            .map(parse_parameter)
            .collect::<Result<Vec<_>, _>>()?;
        groups.push(ParameterGroup {
            max_index,
            parameters,
        });
    }
    Ok(ModuleDescriptor {
        docs,
        category,
        groups,
    })
}
