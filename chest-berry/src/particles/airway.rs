//! 气道粒子: 固定的三轮采样.
//!
//! 第一轮从逐体素撒点 (或给定粒子) 开始, 使用 `uni` 势能, 不使用特征强度;
//! 之后两轮都从上一轮的输出开始, 使用 `add` 势能, 打开特征强度并关闭掩膜.

use std::path::{Path, PathBuf};

use super::{
    render_pass_args, CommandRunner, Energy, FeatureType, InitMode, ParticlesError, PassParams,
    SamplerInput, DEFAULT_EXPORTER, DEFAULT_SAMPLER,
};

/// 每轮的调度参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PassSchedule {
    /// 迭代次数.
    pub iterations: u32,
    /// 空间相互作用半径.
    pub irad: f64,
    /// 尺度相互作用半径.
    pub srad: f64,
    /// 种群控制周期.
    pub population_control_period: u32,
    /// alpha.
    pub alpha: f64,
    /// beta.
    pub beta: f64,
    /// gamma.
    pub gamma: f64,
}

macro_rules! pass {
    ($iter: expr, $irad: expr, $srad: expr, $pcp: expr, $alpha: expr, $beta: expr, $gamma: expr) => {
        PassSchedule {
            iterations: $iter,
            irad: $irad,
            srad: $srad,
            population_control_period: $pcp,
            alpha: $alpha,
            beta: $beta,
            gamma: $gamma,
        }
    };
}

/// 气道粒子的三轮调度.
pub const AIRWAY_SCHEDULE: [PassSchedule; 3] = [
    pass!(100, 1.7, 1.2, 6, 1.0, 0.77, 0.37),
    pass!(10, 1.15, 2.0, 20, 0.35, 0.75, 0.53),
    pass!(75, 1.15, 4.0, 17, 0.84, 0.57, 0.57),
];

/// 逐体素撒点时每体素的粒子数与尺度样本数.
const PER_VOXEL_INIT: InitMode = InitMode::PerVoxel { ppv: 2, nss: 2 };

/// 气道粒子的可调参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AirwayParticlesOptions {
    /// 最大尺度. 需要更粗的结构时应增大降采样倍率而不是该值.
    pub max_scale: f64,
    /// 存活阈值.
    pub live_thresh: f64,
    /// 播种阈值.
    pub seed_thresh: f64,
    /// 尺度样本数 (预模糊次数).
    pub scale_samples: u32,
    /// 降采样倍率, 不小于 1.
    pub down_sample_rate: f64,
    /// 强度下限.
    pub min_intensity: f64,
    /// 强度上限.
    pub max_intensity: f64,
    /// 采样程序.
    pub sampler: String,
    /// 导出程序.
    pub exporter: String,
    /// 完成后保留临时文件.
    pub keep_tmp: bool,
}

impl Default for AirwayParticlesOptions {
    fn default() -> Self {
        Self {
            max_scale: 6.0,
            live_thresh: 40.0,
            seed_thresh: 30.0,
            scale_samples: 5,
            down_sample_rate: 1.0,
            min_intensity: -1100.0,
            max_intensity: -400.0,
            sampler: DEFAULT_SAMPLER.to_owned(),
            exporter: DEFAULT_EXPORTER.to_owned(),
            keep_tmp: false,
        }
    }
}

impl AirwayParticlesOptions {
    fn validate(&self) -> Result<(), ParticlesError> {
        if !(self.max_scale > 0.0) {
            return Err(ParticlesError::InvalidParameter(format!(
                "max scale must be positive, got {}",
                self.max_scale
            )));
        }
        if self.scale_samples == 0 {
            return Err(ParticlesError::InvalidParameter(
                "scale samples must be positive".into(),
            ));
        }
        if !(self.down_sample_rate >= 1.0) {
            return Err(ParticlesError::InvalidParameter(format!(
                "down sample rate must be >= 1, got {}",
                self.down_sample_rate
            )));
        }
        if self.min_intensity > self.max_intensity {
            return Err(ParticlesError::InvalidParameter(format!(
                "min intensity {} > max intensity {}",
                self.min_intensity, self.max_intensity
            )));
        }
        Ok(())
    }
}

/// 气道粒子任务.
#[derive(Clone, Debug)]
pub struct AirwayParticles {
    input: PathBuf,
    output: PathBuf,
    tmp_dir: PathBuf,
    mask: Option<PathBuf>,
    init_particles: Option<PathBuf>,
    options: AirwayParticlesOptions,
}

impl AirwayParticles {
    /// 创建任务. `output` 为最终 vtk 粒子文件, 中间结果写入 `tmp_dir`.
    pub fn new<P: Into<PathBuf>>(input: P, output: P, tmp_dir: P, options: AirwayParticlesOptions) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            tmp_dir: tmp_dir.into(),
            mask: None,
            init_particles: None,
            options,
        }
    }

    /// 第一轮使用的播种掩膜.
    pub fn with_mask<P: Into<PathBuf>>(mut self, mask: P) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// 第一轮从已有粒子开始, 而不是逐体素撒点.
    pub fn with_initial_particles<P: Into<PathBuf>>(mut self, particles: P) -> Self {
        self.init_particles = Some(particles.into());
        self
    }

    /// 参数.
    #[inline]
    pub fn options(&self) -> &AirwayParticlesOptions {
        &self.options
    }

    /// 第 `n` 轮 (从 1 开始) 的输出文件.
    pub fn pass_output(&self, n: usize) -> PathBuf {
        self.tmp_dir.join(format!("pass{n}.nrrd"))
    }

    /// 三轮的完整参数.
    pub fn passes(&self) -> Vec<PassParams> {
        AIRWAY_SCHEDULE
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let first = i == 0;
                let init = if first {
                    match &self.init_particles {
                        Some(p) => InitMode::Particles(p.clone()),
                        None => PER_VOXEL_INIT,
                    }
                } else {
                    InitMode::Particles(self.pass_output(i))
                };
                PassParams {
                    iterations: s.iterations,
                    irad: s.irad,
                    srad: s.srad,
                    population_control_period: s.population_control_period,
                    alpha: s.alpha,
                    beta: s.beta,
                    gamma: s.gamma,
                    energy: if first { Energy::Uni } else { Energy::Add },
                    use_strength: !first,
                    use_mask: first,
                    init,
                }
            })
            .collect()
    }

    fn sampler_input(&self) -> SamplerInput<'_> {
        let o = &self.options;
        SamplerInput {
            volume: &self.input,
            mask: self.mask.as_deref(),
            feature: FeatureType::ValleyLine,
            max_scale: o.max_scale,
            scale_samples: o.scale_samples,
            live_thresh: o.live_thresh,
            seed_thresh: o.seed_thresh,
            min_intensity: o.min_intensity,
            max_intensity: o.max_intensity,
            down_sample_rate: o.down_sample_rate,
            scale_space_dir: &self.tmp_dir,
        }
    }

    /// 依次运行三轮采样, 然后导出为 vtk. 任一外部程序失败即返回错误.
    pub fn execute<R: CommandRunner>(&self, runner: &mut R) -> Result<&Path, ParticlesError> {
        self.options.validate()?;
        std::fs::create_dir_all(&self.tmp_dir)?;

        let input = self.sampler_input();
        for (i, pass) in self.passes().iter().enumerate() {
            let n = i + 1;
            log::info!("starting pass {n}");
            let args = render_pass_args(&input, pass, &self.pass_output(n));
            runner.run(&self.options.sampler, &args)?;
            log::info!("finished pass {n}");
        }

        let last = self.pass_output(AIRWAY_SCHEDULE.len());
        let args = vec![
            "-i".to_owned(),
            last.display().to_string(),
            "-o".to_owned(),
            self.output.display().to_string(),
        ];
        runner.run(&self.options.exporter, &args)?;
        log::info!("saved particles to {:?}", self.output);

        if !self.options.keep_tmp {
            self.clean_tmp_dir()?;
        }
        Ok(self.output.as_path())
    }

    /// 删除各轮的中间文件.
    fn clean_tmp_dir(&self) -> Result<(), ParticlesError> {
        for n in 1..=AIRWAY_SCHEDULE.len() {
            match std::fs::remove_file(self.pass_output(n)) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }
}
