//! 由模块描述渲染 Python 包装类源码.

use super::descriptor::{Channel, ModuleDescriptor, Parameter};
use super::CodegenError;

/// trait 的关键字参数值.
#[derive(Clone, Debug, PartialEq)]
enum TraitArg {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// 保持插入顺序的关键字参数表. 重复设置同一个键只替换值.
#[derive(Clone, Debug, Default)]
struct TraitParams(Vec<(&'static str, TraitArg)>);

impl TraitParams {
    fn set(&mut self, key: &'static str, value: TraitArg) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| *k != key);
    }

    /// 追加到字符串参数末尾.
    fn append(&mut self, key: &'static str, suffix: &str) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, TraitArg::Str(s))) => s.push_str(suffix),
            _ => self.set(key, TraitArg::Str(suffix.to_owned())),
        }
    }

    /// `k1="v1", k2=v2`. 字符串中的双引号替换为单引号.
    fn render(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| match v {
                TraitArg::Str(s) => format!("{k}=\"{}\"", s.replace('"', "'")),
                TraitArg::Int(i) => format!("{k}={i}"),
                TraitArg::Bool(b) => format!("{k}={}", if *b { "True" } else { "False" }),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 位置参数值, 非空时以 `", "` 结尾.
fn render_values(values: &[String]) -> String {
    if values.is_empty() {
        String::new()
    } else {
        format!("{}, ", values.join(", "))
    }
}

/// 参数类型对应的格式串.
fn arg_format(kind: &str) -> Option<&'static str> {
    Some(match kind {
        "directory" | "file" | "image" | "transform" | "string" | "table" | "point" | "region"
        | "geometry" => "%s",
        "string-enumeration" | "integer-enumeration" | "float-enumeration" | "double-enumeration" => "%s",
        "integer" => "%d",
        "double" | "float" => "%f",
        "boolean" => "",
        _ => return None,
    })
}

/// 参数类型对应的 trait 类型.
fn trait_type(kind: &str) -> Option<&'static str> {
    Some(match kind {
        "integer" => "traits.Int",
        "double" | "float" => "traits.Float",
        "image" | "transform" | "file" | "geometry" | "table" => "File",
        "boolean" => "traits.Bool",
        "string" => "traits.Str",
        "directory" => "Directory",
        "point" | "region" => "traits.List",
        _ => return None,
    })
}

fn unknown_type(kind: &str) -> CodegenError {
    CodegenError::UnknownParameterType(kind.to_owned())
}

/// 输出参数的默认文件名: 参数名加上 `fileExtensions` 中的第一个扩展名,
/// 没有时按类型取默认扩展名.
fn output_filename(param: &Parameter, base: &str) -> String {
    let ext = match param.file_extensions.as_deref() {
        Some(exts) if !exts.is_empty() => exts.split(',').next().unwrap_or_default(),
        _ => match param.kind.as_str() {
            "image" => ".nii",
            "transform" => ".mat",
            "geometry" => ".vtk",
            _ => "",
        },
    };
    format!("{base}{ext}")
}

/// 一个模块的 trait 定义.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedTraits {
    /// 输入 trait 定义行.
    pub inputs: Vec<String>,
    /// 输出 trait 定义行.
    pub outputs: Vec<String>,
    /// 输出参数的默认文件名.
    pub output_filenames: Vec<(String, String)>,
}

impl RenderedTraits {
    /// 渲染单个参数. `max_index` 为所在分组的最大位置下标.
    pub fn push(&mut self, param: &Parameter, max_index: i64) -> Result<(), CodegenError> {
        let mut params = TraitParams::default();

        let name = match param.longflag_name() {
            Some(flag) => {
                params.set("argstr", TraitArg::Str(format!("--{flag} ")));
                super::descriptor::to_python_identifier(flag)
            }
            None => {
                let raw = param.name.as_deref().ok_or(CodegenError::MissingName)?;
                let name = super::descriptor::to_python_identifier(raw);
                let argstr = if param.index.is_some() {
                    String::new()
                } else {
                    format!("--{name} ")
                };
                params.set("argstr", TraitArg::Str(argstr));
                name
            }
        };

        if let Some(desc) = param.description.as_deref() {
            params.set(
                "desc",
                TraitArg::Str(desc.replace('"', "\\\"").replace('\n', ", ")),
            );
        }

        let kind = param.kind.as_str();
        let vector_base = kind.strip_suffix("-vector");
        if vector_base.is_some() {
            params.append("argstr", "%s");
        } else {
            params.append("argstr", arg_format(kind).ok_or_else(|| unknown_type(kind))?);
        }

        if let Some(index) = param.index {
            params.set("position", TraitArg::Int(index - (max_index + 1)));
            // 位置参数的说明不做转义.
            if let Some(desc) = param.description.as_deref() {
                params.set("desc", TraitArg::Str(desc.to_owned()));
            }
        }

        let (ty, values): (&str, Vec<String>) = if kind.ends_with("-enumeration") {
            let values = param.elements.iter().map(|e| format!("\"{e}\"")).collect();
            ("traits.Enum", values)
        } else if let Some(base) = vector_base {
            params.set("sep", TraitArg::Str(",".into()));
            let inner = trait_type(base).ok_or_else(|| unknown_type(kind))?;
            ("InputMultiPath", vec![inner.to_owned()])
        } else if param.multiple {
            let inner = trait_type(kind).ok_or_else(|| unknown_type(kind))?;
            let value = if param.is_file_like() {
                format!("{inner}(exists=True)")
            } else if matches!(kind, "point" | "region") {
                format!("{inner}(traits.Float(), minlen=3, maxlen=3)")
            } else {
                inner.to_owned()
            };
            params.append("argstr", "...");
            ("InputMultiPath", vec![value])
        } else {
            (trait_type(kind).ok_or_else(|| unknown_type(kind))?, Vec::new())
        };

        if !param.is_file_like() {
            self.inputs.push(format!(
                "{name} = {ty}({}{})",
                render_values(&values),
                params.render()
            ));
            return Ok(());
        }

        match (param.channel.as_deref(), param.channel()) {
            (None, _) => Err(CodegenError::MissingChannel { parameter: name }),
            (Some(found), None) => Err(CodegenError::InvalidChannel {
                parameter: name,
                channel: found.to_owned(),
            }),
            (_, Some(Channel::Output)) => {
                params.set("hash_files", TraitArg::Bool(false));
                self.inputs.push(format!(
                    "{name} = traits.Either(traits.Bool, {ty}({}), {})",
                    render_values(&values).replace("exists=True", ""),
                    params.render()
                ));
                params.set("exists", TraitArg::Bool(true));
                params.remove("argstr");
                params.remove("hash_files");
                self.outputs.push(format!(
                    "{name} = {}({}{})",
                    ty.replace("Input", "Output"),
                    render_values(&values),
                    params.render()
                ));
                self.output_filenames
                    .push((name.clone(), output_filename(param, &name)));
                Ok(())
            }
            (_, Some(Channel::Input)) => {
                if !matches!(ty, "InputMultiPath" | "traits.List") {
                    params.set("exists", TraitArg::Bool(true));
                }
                self.inputs.push(format!(
                    "{name} = {ty}({}{})",
                    render_values(&values),
                    params.render()
                ));
                Ok(())
            }
        }
    }
}

/// 渲染完整的类源码: `<M>InputSpec`, `<M>OutputSpec` 与主类 `<M>`.
pub fn render_class(
    module: &str,
    descriptor: &ModuleDescriptor,
    launcher: &[String],
) -> Result<String, CodegenError> {
    let mut traits = RenderedTraits::default();
    for group in descriptor.groups.iter() {
        for param in group.parameters.iter() {
            traits.push(param, group.max_index)?;
        }
    }

    let mut input_spec = format!("class {module}InputSpec(CommandLineInputSpec):\n");
    for t in traits.inputs.iter() {
        input_spec.push_str(&format!("    {t}\n"));
    }

    let mut output_spec = format!("class {module}OutputSpec(TraitedSpec):\n");
    if traits.outputs.is_empty() {
        output_spec.push_str("    pass\n");
    }
    for t in traits.outputs.iter() {
        output_spec.push_str(&format!("    {t}\n"));
    }

    let filenames = traits
        .output_filenames
        .iter()
        .map(|(k, v)| format!("'{k}':'{v}'"))
        .collect::<Vec<_>>()
        .join(",");

    let mut doc = String::from("\"\"\"");
    for (field, text) in descriptor.docs.iter() {
        doc.push_str(&format!("{field}: {text}\n\n"));
    }
    doc.push_str("\"\"\"");

    let main_class = format!(
        "class {module}(SEMLikeCommandLine):\n    {doc}\n\n    input_spec = {module}InputSpec\n    output_spec = {module}OutputSpec\n    _cmd = \"{launcher} {module} \"\n    _outputs_filenames = {{{filenames}}}\n",
        launcher = launcher.join(" ")
    );

    Ok(format!("{input_spec}\n\n{output_spec}\n\n{main_class}"))
}
