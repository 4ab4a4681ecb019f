//! 为命令行模块生成 Python 流水线封装类.

use std::path::PathBuf;

use anyhow::{bail, Context};
use chest_berry::codegen::{generate_all_classes, grab_xml};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Generate pipeline wrapper classes from module xml descriptions")]
struct Args {
    /// Directory whose sub-directories name the modules to wrap
    #[arg(long, conflicts_with = "module")]
    modules_dir: Option<PathBuf>,
    /// Module to wrap, may be repeated
    #[arg(long)]
    module: Vec<String>,
    /// Launcher prefix preparing the module environment, e.g. `Slicer --launch`
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    launcher: Vec<String>,
    /// Namespace holding the generated classes, defaults to the last part of each category
    #[arg(long)]
    module_name: Option<String>,
    /// Output directory
    #[arg(short = 'o', long, default_value = ".")]
    output: PathBuf,
    /// Print debug information
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose)?;

    let modules = match &args.modules_dir {
        Some(dir) => utils::module_dirs(dir).with_context(|| format!("listing {dir:?}"))?,
        None => args.module.clone(),
    };
    if modules.is_empty() {
        bail!("no modules given, use --modules-dir or --module");
    }
    log::info!("number of modules found: {}", modules.len());

    let launcher = &args.launcher;
    generate_all_classes(
        &modules,
        launcher,
        args.module_name.as_deref(),
        &args.output,
        |m| grab_xml(m, launcher),
    )?;
    Ok(())
}
