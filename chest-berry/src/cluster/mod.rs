//! 粒子点聚类与左右肺标注.
//!
//! 聚类在标准化后的点坐标上进行. 每个簇输出一个子点集,
//! 携带原点集的全部点数组.

mod dbscan;
mod kmeans;
mod left_right;
mod scale;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::geometry::{GeometryError, ParticleSet};

pub use dbscan::{dbscan, DbscanOptions};
pub use kmeans::{kmeans, mini_batch_kmeans, KMeansOptions, MiniBatchKMeansOptions};
pub use left_right::{LeftRightLabeling, LeftRightParticles};
pub use scale::standardize;

/// DBSCAN 噪声点的标签.
pub const NOISE: i64 = -1;

/// 默认随机种子.
pub const DEFAULT_SEED: u64 = 0;

/// 聚类错误.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// 未知的聚类方法名.
    #[error("unknown clustering method `{0}` (expected DBSCAN, KMeans or MiniBatchKMeans)")]
    UnknownMethod(String),

    /// 点数少于簇数.
    #[error("need at least {needed} points, got {found}")]
    TooFewPoints {
        /// 所需点数.
        needed: usize,
        /// 实际点数.
        found: usize,
    },

    /// 参数非法.
    #[error("invalid clustering parameter: {0}")]
    InvalidParameter(String),

    /// K-Means 拟合失败.
    #[error("k-means fit failed: {0}")]
    Fit(#[from] linfa_clustering::KMeansError),

    /// 点集操作错误.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// 聚类方法及其参数.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClusterMethod {
    /// DBSCAN.
    Dbscan(DbscanOptions),
    /// K-Means.
    KMeans(KMeansOptions),
    /// Mini-Batch K-Means.
    MiniBatchKMeans(MiniBatchKMeansOptions),
}

impl Default for ClusterMethod {
    fn default() -> Self {
        Self::Dbscan(DbscanOptions::default())
    }
}

impl ClusterMethod {
    /// 设置簇个数. 对 DBSCAN 无效.
    pub fn with_clusters(self, n_clusters: usize) -> Self {
        match self {
            Self::Dbscan(_) => self,
            Self::KMeans(o) => Self::KMeans(KMeansOptions { n_clusters, ..o }),
            Self::MiniBatchKMeans(o) => Self::MiniBatchKMeans(MiniBatchKMeansOptions { n_clusters, ..o }),
        }
    }

    /// 方法名.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dbscan(_) => "DBSCAN",
            Self::KMeans(_) => "KMeans",
            Self::MiniBatchKMeans(_) => "MiniBatchKMeans",
        }
    }
}

impl Display for ClusterMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClusterMethod {
    type Err = ClusterError;

    /// 按方法名 (不区分大小写) 解析, 参数取默认值.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dbscan" => Ok(Self::Dbscan(DbscanOptions::default())),
            "kmeans" => Ok(Self::KMeans(KMeansOptions::default())),
            "minibatchkmeans" => Ok(Self::MiniBatchKMeans(MiniBatchKMeansOptions::default())),
            _ => Err(ClusterError::UnknownMethod(s.to_owned())),
        }
    }
}

/// 聚类结果: 每点一个标签, 以及每个非噪声簇的中心 (标准化坐标).
#[derive(Debug, Clone)]
pub struct Clustering {
    /// 每个点的标签.
    pub labels: Vec<i64>,
    /// 第 `i` 行为簇 `i` 的中心.
    pub centroids: Array2<f64>,
}

impl Clustering {
    /// 出现过的标签, 升序 (噪声 `-1` 若存在则在最前).
    pub fn unique_labels(&self) -> Vec<i64> {
        let mut labels = self.labels.clone();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    /// 标签为 `label` 的点下标.
    pub fn members(&self, label: i64) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| (*l == label).then_some(i))
            .collect()
    }
}

/// 对 `points` (每行一个点) 标准化后聚类.
pub fn cluster_points(
    points: &Array2<f64>,
    method: &ClusterMethod,
    seed: u64,
) -> Result<Clustering, ClusterError> {
    let data = standardize(points);
    let rng = StdRng::seed_from_u64(seed);
    let clustering = match method {
        ClusterMethod::Dbscan(options) => {
            let labels = dbscan(&data, options)?;
            let centroids = member_means(&data, &labels);
            Clustering { labels, centroids }
        }
        ClusterMethod::KMeans(options) => kmeans(&data, options, rng)?,
        ClusterMethod::MiniBatchKMeans(options) => mini_batch_kmeans(&data, options, rng)?,
    };
    log::info!(
        "{method}: {} points in {} groups",
        points.nrows(),
        clustering.unique_labels().len()
    );
    Ok(clustering)
}

/// 非噪声簇的成员均值.
fn member_means(data: &Array2<f64>, labels: &[i64]) -> Array2<f64> {
    let k = labels.iter().copied().max().map_or(0, |m| (m + 1).max(0) as usize);
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (p, &l) in data.axis_iter(Axis(0)).zip(labels) {
        if l >= 0 {
            let mut row = sums.row_mut(l as usize);
            row += &p;
            counts[l as usize] += 1;
        }
    }
    for (mut row, count) in sums.axis_iter_mut(Axis(0)).zip(counts) {
        if count > 0 {
            row.mapv_inplace(|v| v / count as f64);
        }
    }
    sums
}

/// 点集坐标转为 `[n, 3]` 数组.
pub fn points_array(set: &ParticleSet) -> Array2<f64> {
    let mut out = Array2::zeros((set.len(), 3));
    for (mut row, p) in out.axis_iter_mut(Axis(0)).zip(set.points()) {
        row.assign(&ndarray::aview1(p));
    }
    out
}

/// 一个簇的粒子.
#[derive(Debug, Clone)]
pub struct ParticleCluster {
    /// 簇标签, 噪声为 [`NOISE`].
    pub label: i64,
    /// 簇内粒子.
    pub particles: ParticleSet,
}

/// 粒子聚类器.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterParticles {
    method: ClusterMethod,
    seed: u64,
}

impl ClusterParticles {
    /// 以给定方法和随机种子创建.
    pub fn new(method: ClusterMethod, seed: u64) -> Self {
        Self { method, seed }
    }

    /// 聚类方法.
    #[inline]
    pub fn method(&self) -> &ClusterMethod {
        &self.method
    }

    /// 聚类, 同时返回原始聚类结果.
    pub fn cluster(&self, set: &ParticleSet) -> Result<(Clustering, Vec<ParticleCluster>), ClusterError> {
        let clustering = cluster_points(&points_array(set), &self.method, self.seed)?;
        let groups = clustering
            .unique_labels()
            .into_iter()
            .map(|label| ParticleCluster {
                label,
                particles: set.select(&clustering.members(label)),
            })
            .collect();
        Ok((clustering, groups))
    }

    /// 聚类并按标签升序返回每个簇的子点集.
    pub fn execute(&self, set: &ParticleSet) -> Result<Vec<ParticleCluster>, ClusterError> {
        self.cluster(set).map(|(_, groups)| groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{DataArray, ScalarType};

    /// 围绕 `center` 的 `n` 个点, 成一个小网格.
    fn blob(center: [f64; 3], n: usize) -> Vec<[f64; 3]> {
        (0..n)
            .map(|i| {
                let dx = (i % 4) as f64 * 0.5;
                let dy = (i / 4) as f64 * 0.5;
                [center[0] + dx, center[1] + dy, center[2] + dx]
            })
            .collect()
    }

    fn two_blobs() -> ParticleSet {
        let mut points = blob([0.0, 0.0, 0.0], 12);
        points.extend(blob([100.0, 100.0, 100.0], 12));
        let n = points.len();
        let mut set = ParticleSet::from_points(points);
        set.set_point_array(DataArray::new(
            "scale",
            1,
            ScalarType::Float,
            (0..n).map(|i| i as f64).collect(),
        ))
        .unwrap();
        set
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("DBSCAN".parse::<ClusterMethod>().unwrap(), ClusterMethod::default());
        assert_eq!(
            "KMeans".parse::<ClusterMethod>().unwrap().with_clusters(3),
            ClusterMethod::KMeans(KMeansOptions {
                n_clusters: 3,
                ..KMeansOptions::default()
            })
        );
        assert!(matches!(
            "MiniBatchKMeans".parse::<ClusterMethod>().unwrap(),
            ClusterMethod::MiniBatchKMeans(MiniBatchKMeansOptions { batch_size: 20, .. })
        ));
        assert!(matches!(
            "Spectral".parse::<ClusterMethod>(),
            Err(ClusterError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_dbscan_groups_carry_arrays() {
        let set = two_blobs();
        let groups = ClusterParticles::default().execute(&set).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, 0);
        assert_eq!(groups[1].label, 1);
        assert_eq!(groups[0].particles.len(), 12);
        assert_eq!(
            groups[1].particles.point_array("scale").unwrap().values,
            (12..24).map(|i| i as f64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_noise_group_first() {
        let mut set = two_blobs();
        set = ParticleSet::concat([&set, &ParticleSet::from_points(vec![[50.0, 80.0, 25.0]])]);
        let groups = ClusterParticles::default().execute(&set).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].label, NOISE);
        assert_eq!(groups[0].particles.points(), [[50.0, 80.0, 25.0]]);
    }

    #[test]
    fn test_kmeans_clusters() {
        let method = ClusterMethod::KMeans(KMeansOptions::default()).with_clusters(2);
        let (clustering, groups) = ClusterParticles::new(method, 11).cluster(&two_blobs()).unwrap();
        assert_eq!(clustering.centroids.nrows(), 2);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.particles.len() == 12));
    }
}
