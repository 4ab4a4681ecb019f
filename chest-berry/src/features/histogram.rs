//! 基于核密度估计的 CT 强度直方图特征.

use super::kde::GaussianKde;
use super::{FeatureError, FeatureExtractor};

/// 核密度直方图提取器.
///
/// 对每个 patch 的 HU 样本做高斯核密度估计 (Botev 扩散法带宽), 在
/// `lower..=upper` 的每个整数 HU 上取值并归一化, 因此一行的所有 `hu*`
/// 列之和为 1. 列名为 `hu<k>`.
#[derive(Debug, Clone, Copy)]
pub struct KdeHistogramExtractor {
    lower_limit: i32,
    upper_limit: i32,
}

impl KdeHistogramExtractor {
    /// 构建提取器. 当 `lower_limit > upper_limit`, 或格点数超出 `usize` 时返回 `Err`.
    pub fn new(lower_limit: i32, upper_limit: i32) -> Result<Self, FeatureError> {
        let width = i64::from(upper_limit) - i64::from(lower_limit) + 1;
        if width < 1 || usize::try_from(width).is_err() {
            return Err(FeatureError::InvalidRange {
                lower: lower_limit,
                upper: upper_limit,
            });
        }
        Ok(Self {
            lower_limit,
            upper_limit,
        })
    }

    /// 肺实质常用的 `[-1000, -350]` 区间.
    #[inline]
    pub fn lung_default() -> Self {
        Self {
            lower_limit: -1000,
            upper_limit: -350,
        }
    }

    /// 直方图下限 (含).
    #[inline]
    pub fn lower_limit(&self) -> i32 {
        self.lower_limit
    }

    /// 直方图上限 (含).
    #[inline]
    pub fn upper_limit(&self) -> i32 {
        self.upper_limit
    }

    /// 格点数, 即 `hu*` 列数.
    #[inline]
    pub fn bin_count(&self) -> usize {
        // 构造时已确认为正且能放入 usize.
        (i64::from(self.upper_limit) - i64::from(self.lower_limit) + 1) as usize
    }
}

impl FeatureExtractor for KdeHistogramExtractor {
    fn columns(&self) -> Vec<String> {
        (self.lower_limit..=self.upper_limit)
            .map(|k| format!("hu{k}"))
            .collect()
    }

    fn patch_features(&self, samples: &[f32]) -> Result<Vec<Option<f64>>, FeatureError> {
        if samples.is_empty() {
            return Ok(vec![None; self.bin_count()]);
        }
        let kde = GaussianKde::botev(samples.iter().map(|&s| f64::from(s))).ok_or_else(|| {
            FeatureError::NonFiniteSamples {
                count: samples.iter().filter(|s| !s.is_finite()).count(),
            }
        })?;
        let bins = kde.normalized_bins(self.lower_limit, self.upper_limit);
        let (lo, hi) = samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        if hi < self.lower_limit as f32 || lo > self.upper_limit as f32 {
            log::debug!(
                "patch of {} samples in [{lo}, {hi}] lies outside [{}, {}], bandwidth {:.3}",
                samples.len(),
                self.lower_limit,
                self.upper_limit,
                kde.bandwidth()
            );
        }
        Ok(bins.into_iter().map(Some).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            KdeHistogramExtractor::new(8, 5),
            Err(FeatureError::InvalidRange { lower: 8, upper: 5 })
        ));
        assert!(KdeHistogramExtractor::new(5, 5).is_ok());

        if let Ok(full) = KdeHistogramExtractor::new(i32::MIN, i32::MAX) {
            assert_eq!(full.bin_count() as u64, 1u64 << 32);
        }
    }

    #[test]
    fn test_samples_outside_range_still_sum_to_one() {
        let h = KdeHistogramExtractor::lung_default();
        for samples in [&[200.0f32, 210.0, 220.0][..], &[-3000.0, -2990.0][..]] {
            let row: Vec<f64> = h.patch_features(samples).unwrap().into_iter().flatten().collect();
            assert_eq!(row.len(), 651);
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{sum}");
        }
        let soft_tissue: Vec<f64> = h
            .patch_features(&[200.0, 210.0, 220.0])
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!(soft_tissue[650] > soft_tissue[0]);
    }

    #[test]
    fn test_non_finite_samples_rejected() {
        let h = KdeHistogramExtractor::new(-10, 10).unwrap();
        assert!(matches!(
            h.patch_features(&[1.0, f32::NAN, f32::INFINITY]),
            Err(FeatureError::NonFiniteSamples { count: 2 })
        ));
    }

    #[test]
    fn test_columns() {
        let h = KdeHistogramExtractor::new(-2, 1).unwrap();
        assert_eq!(h.columns(), ["hu-2", "hu-1", "hu0", "hu1"]);
        assert_eq!(KdeHistogramExtractor::lung_default().columns().len(), 651);
    }

    #[test]
    fn test_row_sums_to_one() {
        let h = KdeHistogramExtractor::lung_default();
        let samples = [-950.0, -910.0, -870.5, -860.0, -820.0, -400.0, -1200.0];
        let row = h.patch_features(&samples).unwrap();
        assert_eq!(row.len(), 651);
        let sum: f64 = row.iter().map(|v| v.unwrap()).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_peaks_at_sample() {
        let h = KdeHistogramExtractor::new(-3, 3).unwrap();
        let row: Vec<f64> = h.patch_features(&[0.0]).unwrap().into_iter().flatten().collect();
        let argmax = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(argmax, Some(3));
    }
}
