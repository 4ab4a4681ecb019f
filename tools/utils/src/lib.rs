//! 命令行工具依赖的通用组件.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use chest_berry::particles::DEFAULT_SAMPLER;
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// 初始化日志. 默认 `Info` 级别, `verbose` 时为 `Debug`.
pub fn init_logger(verbose: bool) -> Result<(), log::SetLoggerError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 获取临时目录.
///
/// 1. 若环境变量 `$CIP_TMP_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/.cip/tmp`. 无法确定主目录时返回 `None`.
pub fn tmp_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("CIP_TMP_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => {
            let mut ans = dirs::home_dir()?;
            ans.extend([".cip", "tmp"]);
            Some(ans)
        }
    }
}

/// 获取粒子采样程序名: `$CIP_SAMPLER`, 否则为默认的 `puller`.
pub fn sampler_from_env() -> String {
    env::var("CIP_SAMPLER")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SAMPLER.to_owned())
}

/// 列出 `dir` 的直接子目录名, 升序排列. 每个子目录对应一个命令行模块.
pub fn module_dirs<P: AsRef<Path>>(dir: P) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort_unstable();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmp_dir_from_env() {
        env::set_var("CIP_TMP_DIR", "/data/cip-tmp");
        assert_eq!(tmp_dir_from_env_or_home(), Some(PathBuf::from("/data/cip-tmp")));
        env::remove_var("CIP_TMP_DIR");

        if let Some(home) = dirs::home_dir() {
            assert_eq!(tmp_dir_from_env_or_home(), Some(home.join(".cip").join("tmp")));
        }
    }

    #[test]
    fn test_sampler_from_env() {
        env::remove_var("CIP_SAMPLER");
        assert_eq!(sampler_from_env(), "puller");
        env::set_var("CIP_SAMPLER", "/opt/teem/bin/puller");
        assert_eq!(sampler_from_env(), "/opt/teem/bin/puller");
        env::remove_var("CIP_SAMPLER");
    }

    #[test]
    fn test_module_dirs() {
        let dir = env::temp_dir().join(format!("chest-berry-modules-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        for m in ["ReadNRRDsWriteVTK", "CropLung", "GenerateLobeSurfaceModels"] {
            std::fs::create_dir_all(dir.join(m)).unwrap();
        }
        std::fs::write(dir.join("CMakeLists.txt"), "").unwrap();

        assert_eq!(
            module_dirs(&dir).unwrap(),
            ["CropLung", "GenerateLobeSurfaceModels", "ReadNRRDsWriteVTK"]
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cpus() {
        assert!(cpus() >= 1);
    }
}
