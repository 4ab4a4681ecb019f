//! 逐 patch 提取距离与 HU 直方图特征, 合并成一张特征表.

use std::path::PathBuf;

use anyhow::Context;
use chest_berry::prelude::*;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Extract per-patch distance and intensity histogram features")]
struct Args {
    /// Input CT volume (.nii/.nii.gz)
    #[arg(short = 'i', long = "ct")]
    ct: PathBuf,
    /// Input distance map
    #[arg(short = 'd', long = "distance")]
    distance: PathBuf,
    /// Input chest label map
    #[arg(short = 'l', long = "labels")]
    labels: PathBuf,
    /// Input patch map
    #[arg(short = 'p', long = "patches")]
    patches: PathBuf,
    /// Prior feature table (.csv) to merge into
    #[arg(long)]
    prior: Option<PathBuf>,
    /// Lower histogram limit in HU (inclusive)
    #[arg(long, default_value_t = -1000, allow_hyphen_values = true)]
    lower: i32,
    /// Upper histogram limit in HU (inclusive)
    #[arg(long, default_value_t = -350, allow_hyphen_values = true)]
    upper: i32,
    /// Chest region used in the distance column name
    #[arg(long, default_value = "WholeLung")]
    region: String,
    /// Chest type used in the distance column name
    #[arg(long = "type", default_value = "UndefinedType")]
    chest_type: String,
    /// Output feature table (.csv)
    #[arg(short = 'o', long)]
    output: PathBuf,
    /// Thread count, defaults to the number of available cores
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    /// Print debug information
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.unwrap_or_else(utils::cpus))
        .build_global()
        .context("failed to configure thread pool")?;

    let region = ChestRegion::from_name(&args.region);
    let ty = ChestType::from_name(&args.chest_type);
    if region.is_undefined() && args.region != region.name() {
        log::warn!("unknown chest region `{}`, using {region}", args.region);
    }
    let dist_extractor = DistanceExtractor::new(region, ty);
    let hist_extractor = KdeHistogramExtractor::new(args.lower, args.upper)?;

    let ct = CtScan::open(&args.ct).with_context(|| format!("reading {:?}", args.ct))?;
    let dist = DistanceMap::open(&args.distance).with_context(|| format!("reading {:?}", args.distance))?;
    let labels = LabelMap::open(&args.labels).with_context(|| format!("reading {:?}", args.labels))?;
    let patches = PatchMap::open(&args.patches).with_context(|| format!("reading {:?}", args.patches))?;

    let prior = match &args.prior {
        Some(p) => FeatureTable::load_csv(p).with_context(|| format!("reading {p:?}"))?,
        None => FeatureTable::new(),
    };

    let table = dist_extractor.fit(&ExtractorInput::new(&dist, &labels, &patches)?, &prior)?;
    log::info!("{} computed for {} patches", dist_extractor.column_name(), table.len());
    let table = hist_extractor.fit(&ExtractorInput::new(&ct, &labels, &patches)?, &table)?;
    log::info!(
        "histogram hu{}..hu{} computed",
        hist_extractor.lower_limit(),
        hist_extractor.upper_limit()
    );

    table
        .save_csv(&args.output)
        .with_context(|| format!("writing {:?}", args.output))?;
    log::info!(
        "wrote {} rows x {} columns to {:?}",
        table.len(),
        table.columns().len(),
        args.output
    );
    Ok(())
}
