//! K-Means 与 Mini-Batch K-Means, 由 `linfa-clustering` 拟合.
//!
//! 两者都使用 k-means++ 初始化. 随机数生成器由调用方传入,
//! 相同种子给出相同结果.

use linfa::traits::{Fit, FitWith, Predict};
use linfa::{DatasetBase, ParamGuard};
use linfa_clustering::{KMeans, KMeansInit};
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use super::{ClusterError, Clustering};

/// K-Means 参数.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KMeansOptions {
    /// 簇个数.
    pub n_clusters: usize,
    /// 每次运行的最大迭代数.
    pub max_iter: u64,
    /// 收敛阈值.
    pub tol: f64,
    /// 重复次数, 保留惯性最小的一次.
    pub n_init: usize,
}

impl Default for KMeansOptions {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
        }
    }
}

/// Mini-Batch K-Means 参数.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MiniBatchKMeansOptions {
    /// 簇个数.
    pub n_clusters: usize,
    /// 每批样本数.
    pub batch_size: usize,
    /// 最大批次数.
    pub max_iter: usize,
    /// 批惯性连续多少次未改善即停止.
    pub max_no_improvement: usize,
    /// 首批初始化的重复次数.
    pub n_init: usize,
}

impl Default for MiniBatchKMeansOptions {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            batch_size: 20,
            max_iter: 100,
            max_no_improvement: 10,
            n_init: 10,
        }
    }
}

fn check_clusters(n_clusters: usize, n_points: usize) -> Result<(), ClusterError> {
    if n_clusters == 0 {
        return Err(ClusterError::InvalidParameter("n_clusters must be positive".into()));
    }
    if n_points < n_clusters {
        return Err(ClusterError::TooFewPoints {
            needed: n_clusters,
            found: n_points,
        });
    }
    Ok(())
}

fn into_clustering(model: &KMeans<f64, L2Dist>, data: &Array2<f64>) -> Clustering {
    let labels: Array1<usize> = model.predict(data);
    Clustering {
        labels: labels.iter().map(|&l| l as i64).collect(),
        centroids: model.centroids().clone(),
    }
}

/// 标准 K-Means: 重复 `n_init` 次, 保留惯性最小的结果.
pub fn kmeans<R: Rng + Clone>(
    data: &Array2<f64>,
    options: &KMeansOptions,
    rng: R,
) -> Result<Clustering, ClusterError> {
    check_clusters(options.n_clusters, data.nrows())?;
    let dataset = DatasetBase::from(data.clone());
    let model = KMeans::params_with(options.n_clusters, rng, L2Dist)
        .init_method(KMeansInit::KMeansPlusPlus)
        .n_runs(options.n_init)
        .max_n_iterations(options.max_iter)
        .tolerance(options.tol)
        .check()
        .map_err(|e| ClusterError::InvalidParameter(e.to_string()))?
        .fit(&dataset)?;
    Ok(into_clustering(&model, data))
}

/// Mini-Batch K-Means.
///
/// 每轮打乱点序后切成 `batch_size` 大小的批次, 逐批增量更新中心.
/// 批惯性连续 `max_no_improvement` 批未下降, 或用满 `max_iter` 批后停止.
pub fn mini_batch_kmeans<R: Rng + Clone>(
    data: &Array2<f64>,
    options: &MiniBatchKMeansOptions,
    mut rng: R,
) -> Result<Clustering, ClusterError> {
    check_clusters(options.n_clusters, data.nrows())?;
    if options.batch_size == 0 || options.max_iter == 0 {
        return Err(ClusterError::InvalidParameter(
            "batch_size and max_iter must be positive".into(),
        ));
    }
    let n = data.nrows();
    // 首批至少要能放下全部初始中心.
    let batch_size = options.batch_size.clamp(options.n_clusters, n);

    let params = KMeans::params_with(options.n_clusters, rng.clone(), L2Dist)
        .init_method(KMeansInit::KMeansPlusPlus)
        .n_runs(options.n_init)
        .check()
        .map_err(|e| ClusterError::InvalidParameter(e.to_string()))?;

    let mut order: Vec<usize> = (0..n).collect();
    let mut model: Option<KMeans<f64, L2Dist>> = None;
    let mut best_inertia = f64::INFINITY;
    let mut no_improvement = 0;
    let mut batches = 0;
    'epochs: loop {
        order.shuffle(&mut rng);
        for chunk in order.chunks(batch_size) {
            // 末尾不足的批次并入下一轮.
            if chunk.len() < batch_size {
                break;
            }
            let batch = DatasetBase::from(data.select(Axis(0), chunk));
            let fitted = params.fit_with(model.take(), &batch)?;
            let inertia = fitted.inertia();
            model = Some(fitted);

            batches += 1;
            if inertia < best_inertia {
                best_inertia = inertia;
                no_improvement = 0;
            } else {
                no_improvement += 1;
            }
            if batches >= options.max_iter || no_improvement >= options.max_no_improvement {
                break 'epochs;
            }
        }
    }
    log::debug!("mini-batch k-means stopped after {batches} batches");

    match model {
        Some(model) => Ok(into_clustering(&model, data)),
        None => Err(ClusterError::TooFewPoints {
            needed: batch_size,
            found: n,
        }),
    }
}
