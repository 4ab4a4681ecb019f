//! 对粒子点聚类, 或将其划分为左右两侧.

use std::path::PathBuf;

use anyhow::Context;
use chest_berry::cluster::DEFAULT_SEED;
use chest_berry::prelude::*;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(about = "Cluster particle points")]
struct Args {
    /// Input particle file (vtk) to cluster
    #[arg(short = 'i', long = "input")]
    input: PathBuf,
    /// Output prefix name
    #[arg(long = "op")]
    output_prefix: String,
    /// Output suffix name
    #[arg(long = "os", default_value = ".vtk")]
    output_suffix: String,
    /// Split particles in left/right lung
    #[arg(short = 's', long = "split")]
    split: bool,
    /// Save left/right particles in a single vtk with region/type point data arrays
    #[arg(short = 'l', long = "label")]
    label: bool,
    /// Clustering method: DBSCAN, KMeans or MiniBatchKMeans
    #[arg(short = 'm', long, default_value = "DBSCAN")]
    method: ClusterMethod,
    /// Number of clusters for the k-means methods
    #[arg(short = 'k', long)]
    clusters: Option<usize>,
    /// Random seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Write ASCII instead of binary vtk
    #[arg(long)]
    ascii: bool,
    /// Print debug information
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn encoding(&self) -> VtkEncoding {
        if self.ascii {
            VtkEncoding::Ascii
        } else {
            VtkEncoding::Binary
        }
    }

    fn write(&self, set: &ParticleSet, path: String) -> anyhow::Result<()> {
        write_vtk(set, &path, self.encoding()).with_context(|| format!("writing {path}"))?;
        log::info!("wrote {} particles to {path}", set.len());
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    utils::init_logger(args.verbose)?;

    let input = read_vtk(&args.input).with_context(|| format!("reading {:?}", args.input))?;
    log::info!("read {} particles from {:?}", input.len(), args.input);

    let (prefix, suffix) = (&args.output_prefix, &args.output_suffix);
    if args.split {
        let output = LeftRightLabeling::new(args.seed).execute(&input)?;
        if args.label {
            args.write(&output.both, format!("{prefix}{suffix}"))?;
        } else {
            for (tag, set) in [("right", &output.right), ("left", &output.left)] {
                args.write(set, format!("{prefix}_{tag}{suffix}"))?;
            }
        }
    } else {
        let method = match args.clusters {
            Some(k) => args.method.with_clusters(k),
            None => args.method,
        };
        let clusters = ClusterParticles::new(method, args.seed).execute(&input)?;
        for (k, cluster) in clusters.iter().enumerate() {
            log::debug!("cluster {k} has label {}", cluster.label);
            args.write(&cluster.particles, format!("{prefix}_cluster{k:03}{suffix}"))?;
        }
    }
    Ok(())
}
