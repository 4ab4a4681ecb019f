//! 以三轮粒子采样提取气道粒子.

use std::path::PathBuf;

use anyhow::Context;
use chest_berry::particles::DEFAULT_EXPORTER;
use chest_berry::prelude::*;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Extract airway particles from a CT scan")]
struct Args {
    /// Input CT scan
    #[arg(short = 'i')]
    input_ct: PathBuf,
    /// Input mask for seeding
    #[arg(short = 'm')]
    input_mask: Option<PathBuf>,
    /// Input particle points to initialize (if not specified a per-voxel approach is used)
    #[arg(short = 'p')]
    input_particles: Option<PathBuf>,
    /// Output particles (vtk format)
    #[arg(short = 'o')]
    output_particles: PathBuf,
    /// Tmp directory, defaults to $CIP_TMP_DIR or $HOME/.cip/tmp
    #[arg(short = 't')]
    tmp_dir: Option<PathBuf>,
    /// Max scale
    #[arg(short = 's', default_value_t = 6.0)]
    max_scale: f64,
    /// Down sampling rate (>=1)
    #[arg(short = 'r', default_value_t = 1.0)]
    down_sample_rate: f64,
    /// Number of scale volumes
    #[arg(short = 'n', default_value_t = 5)]
    scale_samples: u32,
    /// Live threshold (>0)
    #[arg(long = "lth", default_value_t = 40.0)]
    live_th: f64,
    /// Seed threshold (>0)
    #[arg(long = "sth", default_value_t = 30.0)]
    seed_th: f64,
    /// Min intensity for feature
    #[arg(long = "minI", default_value_t = -1100.0, allow_hyphen_values = true)]
    min_intensity: f64,
    /// Max intensity for feature
    #[arg(long = "maxI", default_value_t = -400.0, allow_hyphen_values = true)]
    max_intensity: f64,
    /// Particle sampler binary, defaults to $CIP_SAMPLER or `puller`
    #[arg(long)]
    sampler: Option<String>,
    /// Program converting the last pass to vtk
    #[arg(long, default_value = DEFAULT_EXPORTER)]
    exporter: String,
    /// Keep intermediate files in the tmp directory
    #[arg(long)]
    keep_tmp: bool,
    /// Print debug information
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose)?;

    let tmp_dir = match args.tmp_dir.clone() {
        Some(d) => d,
        None => utils::tmp_dir_from_env_or_home().context("cannot determine a tmp directory")?,
    };
    let options = AirwayParticlesOptions {
        max_scale: args.max_scale,
        live_thresh: args.live_th,
        seed_thresh: args.seed_th,
        scale_samples: args.scale_samples,
        down_sample_rate: args.down_sample_rate,
        min_intensity: args.min_intensity,
        max_intensity: args.max_intensity,
        sampler: args.sampler.clone().unwrap_or_else(utils::sampler_from_env),
        exporter: args.exporter.clone(),
        keep_tmp: args.keep_tmp,
    };
    log::debug!("{options:?}");

    let mut task = AirwayParticles::new(
        args.input_ct.clone(),
        args.output_particles.clone(),
        tmp_dir,
        options,
    );
    if let Some(mask) = &args.input_mask {
        task = task.with_mask(mask.clone());
    }
    if let Some(particles) = &args.input_particles {
        task = task.with_initial_particles(particles.clone());
    }

    let output = task
        .execute(&mut SystemRunner)
        .context("airway particle extraction failed")?;
    log::info!("airway particles written to {output:?}");
    Ok(())
}
