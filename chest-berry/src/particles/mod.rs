//! 外部粒子采样程序的编排.
//!
//! 采样本身由外部程序完成. 这里负责把每一轮 (pass) 的参数渲染成命令行,
//! 同步运行并检查退出状态.

mod airway;

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Command;

pub use airway::{AirwayParticles, AirwayParticlesOptions, AIRWAY_SCHEDULE};

/// 默认采样程序名.
pub const DEFAULT_SAMPLER: &str = "puller";

/// 默认导出程序名 (nrrd 粒子 -> vtk).
pub const DEFAULT_EXPORTER: &str = "ReadNRRDsWriteVTK";

/// 粒子编排错误.
#[derive(Debug, thiserror::Error)]
pub enum ParticlesError {
    /// 临时目录等文件操作失败.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// 无法启动外部程序.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        /// 程序名.
        program: String,
        /// 底层错误.
        source: std::io::Error,
    },

    /// 外部程序以非零状态退出.
    #[error("`{program}` exited with non-zero status (code {code:?})")]
    ExitStatus {
        /// 程序名.
        program: String,
        /// 退出码, 被信号终止时为 `None`.
        code: Option<i32>,
    },

    /// 参数非法.
    #[error("invalid particles parameter: {0}")]
    InvalidParameter(String),
}

/// 粒子间势能函数.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Energy {
    /// 单一的径向势能.
    Uni,
    /// 空间与尺度两部分相加.
    Add,
}

impl Display for Energy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Energy::Uni => "uni",
            Energy::Add => "add",
        })
    }
}

/// 被采样的结构类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeatureType {
    /// 谷线 (气道).
    ValleyLine,
    /// 脊线 (血管).
    RidgeLine,
    /// 谷面.
    ValleySurface,
    /// 脊面 (裂隙).
    RidgeSurface,
}

impl Display for FeatureType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FeatureType::ValleyLine => "valley_line",
            FeatureType::RidgeLine => "ridge_line",
            FeatureType::ValleySurface => "valley_surface",
            FeatureType::RidgeSurface => "ridge_surface",
        })
    }
}

/// 粒子的初始化方式.
#[derive(Clone, Debug, PartialEq)]
pub enum InitMode {
    /// 逐体素撒点.
    PerVoxel {
        /// 每体素粒子数.
        ppv: u32,
        /// 每体素尺度样本数.
        nss: u32,
    },
    /// 从已有粒子文件开始.
    Particles(PathBuf),
}

/// 单轮采样的参数.
#[derive(Clone, Debug, PartialEq)]
pub struct PassParams {
    /// 迭代次数.
    pub iterations: u32,
    /// 空间相互作用半径.
    pub irad: f64,
    /// 尺度相互作用半径.
    pub srad: f64,
    /// 种群控制周期.
    pub population_control_period: u32,
    /// 势能参数 alpha.
    pub alpha: f64,
    /// 势能参数 beta.
    pub beta: f64,
    /// 势能参数 gamma.
    pub gamma: f64,
    /// 势能函数.
    pub energy: Energy,
    /// 是否使用特征强度.
    pub use_strength: bool,
    /// 是否使用掩膜.
    pub use_mask: bool,
    /// 初始化方式.
    pub init: InitMode,
}

/// 各轮共享的输入与阈值.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerInput<'a> {
    /// 输入体数据.
    pub volume: &'a Path,
    /// 可选掩膜.
    pub mask: Option<&'a Path>,
    /// 结构类型.
    pub feature: FeatureType,
    /// 最大尺度.
    pub max_scale: f64,
    /// 尺度样本数.
    pub scale_samples: u32,
    /// 存活阈值.
    pub live_thresh: f64,
    /// 播种阈值.
    pub seed_thresh: f64,
    /// 强度下限.
    pub min_intensity: f64,
    /// 强度上限.
    pub max_intensity: f64,
    /// 降采样倍率, `1` 表示不降采样.
    pub down_sample_rate: f64,
    /// 预模糊体数据所在目录.
    pub scale_space_dir: &'a Path,
}

/// 渲染一轮采样的命令行参数 (不含程序名).
pub fn render_pass_args(input: &SamplerInput, pass: &PassParams, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut push = |flag: &str, value: String| {
        args.push(flag.to_owned());
        args.push(value);
    };

    push("-vol", input.volume.display().to_string());
    push("-sscp", input.scale_space_dir.display().to_string());
    push("-feature", input.feature.to_string());
    push(
        "-scale",
        format!("0-{}-{}", input.scale_samples, input.max_scale),
    );
    match &pass.init {
        InitMode::PerVoxel { ppv, nss } => {
            push("-ppv", ppv.to_string());
            push("-nss", nss.to_string());
        }
        InitMode::Particles(path) => push("-pi", path.display().to_string()),
    }
    if pass.use_mask {
        if let Some(mask) = input.mask {
            push("-mask", mask.display().to_string());
        }
    }
    push("-enr", pass.energy.to_string());
    push("-alpha", pass.alpha.to_string());
    push("-beta", pass.beta.to_string());
    push("-gamma", pass.gamma.to_string());
    push("-irad", pass.irad.to_string());
    push("-srad", pass.srad.to_string());
    push("-pcp", pass.population_control_period.to_string());
    push("-maxi", pass.iterations.to_string());
    push("-usa", pass.use_strength.to_string());
    push("-lti", input.live_thresh.to_string());
    push("-sti", input.seed_thresh.to_string());
    if input.down_sample_rate > 1.0 {
        push("-dsr", input.down_sample_rate.to_string());
    }
    push(
        "-ivr",
        format!("{},{}", input.min_intensity, input.max_intensity),
    );
    push("-o", output.display().to_string());
    args
}

/// 外部命令运行器.
pub trait CommandRunner {
    /// 同步运行 `program args...`. 非零退出应返回 `Err`.
    fn run(&mut self, program: &str, args: &[String]) -> Result<(), ParticlesError>;
}

/// 通过 [`std::process::Command`] 运行.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[String]) -> Result<(), ParticlesError> {
        log::debug!("running {program} {}", args.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| ParticlesError::Spawn {
                program: program.to_owned(),
                source,
            })?;
        if !status.success() {
            return Err(ParticlesError::ExitStatus {
                program: program.to_owned(),
                code: status.code(),
            });
        }
        Ok(())
    }
}
