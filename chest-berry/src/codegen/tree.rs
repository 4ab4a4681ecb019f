//! 生成代码的包结构.
//!
//! 包结构是一棵带标签的树: 叶子为某个模块的类源码, 内部节点为命名空间.
//! 写盘时, 只含叶子的命名空间成为一个 `.py` 文件; 含有子命名空间的
//! 成为一个子包 (目录), 其中的叶子各自成为一个 `.py` 文件.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::CodegenError;

/// 生成文件的头部.
const FILE_HEADER: &str = "# -*- coding: utf8 -*-
\"\"\"Autogenerated file - DO NOT EDIT
If you spot a bug, please report it on the mailing list and/or change the generator.\"\"\"

from nipype.interfaces.base import CommandLine, CommandLineInputSpec, SEMLikeCommandLine, TraitedSpec, File, Directory, traits, isdefined, InputMultiPath, OutputMultiPath
import os


";

/// 包树节点.
#[derive(Clone, Debug, PartialEq)]
pub enum CodeNode {
    /// 一个类的源码.
    Class(String),
    /// 命名空间.
    Namespace(BTreeMap<String, CodeNode>),
}

/// 包树的根.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackageTree {
    root: BTreeMap<String, CodeNode>,
}

impl PackageTree {
    /// 空树.
    pub fn new() -> Self {
        Self::default()
    }

    /// 根下的节点.
    pub fn root(&self) -> &BTreeMap<String, CodeNode> {
        &self.root
    }

    /// 在命名空间路径 `path` 下放入类 `class` 的源码.
    pub fn insert(&mut self, path: &[&str], class: &str, code: String) {
        fn merge(nodes: &mut BTreeMap<String, CodeNode>, path: &[&str], class: &str, code: String) {
            match path.split_first() {
                None => {
                    nodes.insert(class.to_owned(), CodeNode::Class(code));
                }
                Some((head, rest)) => {
                    let entry = nodes
                        .entry((*head).to_owned())
                        .or_insert_with(|| CodeNode::Namespace(BTreeMap::new()));
                    // 同名的类被命名空间取代.
                    if matches!(entry, CodeNode::Class(_)) {
                        *entry = CodeNode::Namespace(BTreeMap::new());
                    }
                    if let CodeNode::Namespace(children) = entry {
                        merge(children, rest, class, code);
                    }
                }
            }
        }
        merge(&mut self.root, path, class, code);
    }

    /// 写入 `dir`. `dir` 下已有的 `__init__.py` 会被替换.
    pub fn write(&self, dir: &Path) -> Result<(), CodegenError> {
        fs::create_dir_all(dir)?;
        let init = dir.join("__init__.py");
        if init.exists() {
            fs::remove_file(&init)?;
        }
        crawl(&self.root, dir)
    }
}

fn append_init(dir: &Path, line: &str) -> Result<(), CodegenError> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("__init__.py"))?;
    writeln!(f, "{line}")?;
    Ok(())
}

/// 写出 `<module>.py`, 并在 `__init__.py` 中导入其中的类.
fn write_module(dir: &Path, module: &str, classes: &[(&str, &str)]) -> Result<(), CodegenError> {
    let body = classes
        .iter()
        .map(|(_, code)| *code)
        .collect::<Vec<_>>()
        .join("\n\n");
    fs::write(dir.join(format!("{module}.py")), format!("{FILE_HEADER}{body}"))?;

    let names = classes
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    append_init(dir, &format!("from {module} import {names}"))?;
    log::debug!("wrote {}/{module}.py", dir.display());
    Ok(())
}

fn write_setup(dir: &Path, subpackages: &[String]) -> Result<(), CodegenError> {
    let pkg_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sub_pkgs = subpackages
        .iter()
        .map(|p| format!("config.add_data_dir('{p}')"))
        .collect::<Vec<_>>()
        .join("\n    ");
    let text = format!(
        "# emacs: -*- mode: python; py-indent-offset: 4; indent-tabs-mode: nil -*-
# vi: set ft=python sts=4 ts=4 sw=4 et:
def configuration(parent_package='',top_path=None):
    from numpy.distutils.misc_util import Configuration

    config = Configuration('{pkg_name}', parent_package, top_path)

    {sub_pkgs}

    return config

if __name__ == '__main__':
    from numpy.distutils.core import setup
    setup(**configuration(top_path='').todict())
"
    );
    fs::write(dir.join("setup.py"), text)?;
    Ok(())
}

fn crawl(nodes: &BTreeMap<String, CodeNode>, dir: &Path) -> Result<(), CodegenError> {
    let mut subpackages = Vec::new();
    for (name, node) in nodes {
        match node {
            CodeNode::Class(code) => {
                write_module(dir, &name.to_lowercase(), &[(name.as_str(), code.as_str())])?
            }
            CodeNode::Namespace(children) => {
                let classes: Vec<(&str, &str)> = children
                    .iter()
                    .filter_map(|(k, v)| match v {
                        CodeNode::Class(code) => Some((k.as_str(), code.as_str())),
                        CodeNode::Namespace(_) => None,
                    })
                    .collect();
                let namespaces: BTreeMap<String, CodeNode> = children
                    .iter()
                    .filter(|(_, v)| matches!(v, CodeNode::Namespace(_)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();

                let package = name.to_lowercase();
                if !namespaces.is_empty() {
                    append_init(dir, &format!("from {package} import *"))?;
                    let sub_dir = dir.join(&package);
                    if sub_dir.exists() {
                        fs::remove_dir_all(&sub_dir)?;
                    }
                    fs::create_dir(&sub_dir)?;
                    crawl(&namespaces, &sub_dir)?;
                    for (class, code) in classes {
                        write_module(&sub_dir, &class.to_lowercase(), &[(class, code)])?;
                    }
                    subpackages.push(package);
                } else if !classes.is_empty() {
                    write_module(dir, &package, &classes)?;
                }
            }
        }
    }
    if !subpackages.is_empty() {
        write_setup(dir, &subpackages)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chest-berry-codegen-{tag}-{}", std::process::id()))
    }

    #[test]
    fn test_insert_merges_paths() {
        let mut tree = PackageTree::new();
        tree.insert(&["Toolkit", "cip"], "Crop", "A".into());
        tree.insert(&["Toolkit", "cip"], "Pad", "B".into());
        tree.insert(&["Other", "cip"], "Mask", "C".into());

        let Some(CodeNode::Namespace(toolkit)) = tree.root().get("Toolkit") else {
            panic!("missing namespace");
        };
        let Some(CodeNode::Namespace(cip)) = toolkit.get("cip") else {
            panic!("missing namespace");
        };
        assert_eq!(cip.len(), 2);
        assert_eq!(cip.get("Pad"), Some(&CodeNode::Class("B".into())));
        assert_eq!(tree.root().len(), 2);
    }

    #[test]
    fn test_write_layout() {
        let dir = tmp_dir("layout");
        std::fs::remove_dir_all(&dir).ok();

        let mut tree = PackageTree::new();
        tree.insert(&["Toolkit", "cip"], "Crop", "class Crop: pass".into());
        tree.insert(&["Toolkit", "cip"], "Pad", "class Pad: pass".into());
        tree.insert(&["Toolkit"], "Solo", "class Solo: pass".into());
        tree.write(&dir).unwrap();

        let read = |p: &str| std::fs::read_to_string(dir.join(p)).unwrap();
        assert_eq!(read("__init__.py"), "from toolkit import *\n");
        assert!(read("setup.py").contains("config.add_data_dir('toolkit')"));

        let init = read("toolkit/__init__.py");
        assert!(init.contains("from cip import Crop, Pad\n"));
        assert!(init.contains("from solo import Solo\n"));

        let cip = read("toolkit/cip.py");
        assert!(cip.starts_with("# -*- coding: utf8 -*-"));
        assert!(cip.ends_with("class Crop: pass\n\nclass Pad: pass"));
        assert!(read("toolkit/solo.py").ends_with("class Solo: pass"));
        assert!(!dir.join("toolkit/setup.py").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
