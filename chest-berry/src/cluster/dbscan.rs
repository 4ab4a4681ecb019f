//! 基于密度的聚类 (DBSCAN), 由 `linfa-clustering` 计算.

use linfa::traits::Transformer;
use linfa::ParamGuard;
use linfa_clustering::Dbscan;
use ndarray::Array2;

use super::{ClusterError, NOISE};

/// DBSCAN 参数.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DbscanOptions {
    /// 邻域半径.
    pub eps: f64,
    /// 成簇所需的最少点数.
    pub min_samples: usize,
}

impl Default for DbscanOptions {
    fn default() -> Self {
        Self {
            eps: 0.3,
            min_samples: 10,
        }
    }
}

/// 对 `data` (每行一个点) 聚类, 返回每个点的标签. 噪声点为 [`NOISE`].
///
/// 簇按发现顺序编号为 `0, 1, ...`.
pub fn dbscan(data: &Array2<f64>, options: &DbscanOptions) -> Result<Vec<i64>, ClusterError> {
    if options.eps.is_nan() || options.eps <= 0.0 || options.min_samples == 0 {
        return Err(ClusterError::InvalidParameter(
            "eps and min_samples must be positive".into(),
        ));
    }
    let params = Dbscan::params(options.min_samples)
        .tolerance(options.eps)
        .check()
        .map_err(|e| ClusterError::InvalidParameter(e.to_string()))?;
    let memberships = params.transform(data);
    Ok(memberships
        .iter()
        .map(|m| m.map_or(NOISE, |c| c as i64))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_two_groups_and_noise() {
        let mut rows = Vec::new();
        for i in 0..5 {
            rows.push([i as f64 * 0.1, 0.0]);
        }
        for i in 0..5 {
            rows.push([10.0 + i as f64 * 0.1, 0.0]);
        }
        rows.push([5.0, 5.0]);
        let data = arr2(&rows);
        let options = DbscanOptions {
            eps: 0.25,
            min_samples: 3,
        };
        let labels = dbscan(&data, &options).unwrap();
        assert!(labels[..5].iter().all(|l| *l == labels[0]));
        assert!(labels[5..10].iter().all(|l| *l == labels[5]));
        assert_ne!(labels[0], labels[5]);
        assert!(labels[0] >= 0 && labels[5] >= 0);
        assert_eq!(labels[10], NOISE);
    }

    #[test]
    fn test_invalid_parameters() {
        let data = arr2(&[[0.0, 0.0]]);
        for options in [
            DbscanOptions { eps: 0.0, ..Default::default() },
            DbscanOptions { eps: f64::NAN, ..Default::default() },
            DbscanOptions { min_samples: 0, ..Default::default() },
        ] {
            assert!(matches!(
                dbscan(&data, &options),
                Err(ClusterError::InvalidParameter(_))
            ));
        }
    }
}
