//! 逐 patch 特征提取.
//!
//! 每个提取器接受一张先前的特征表, 返回合并了自身特征列的新表.
//! 多个提取器可以以任意顺序串联; 特征列互不相交时, 结果行与串联顺序无关.
//!
//! ```no_run
//! use chest_berry::features::{DistanceExtractor, ExtractorInput, FeatureExtractor, KdeHistogramExtractor};
//! use chest_berry::prelude::*;
//!
//! # fn run(ct: &CtScan, dist: &DistanceMap, lm: &LabelMap, patches: &PatchMap) -> Result<(), Box<dyn std::error::Error>> {
//! let dist_extractor = DistanceExtractor::new(ChestRegion::WholeLung, ChestType::UndefinedType);
//! let hist_extractor = KdeHistogramExtractor::new(-1000, -350)?;
//!
//! let table = dist_extractor.fit(&ExtractorInput::new(dist, lm, patches)?, &FeatureTable::new())?;
//! let table = hist_extractor.fit(&ExtractorInput::new(ct, lm, patches)?, &table)?;
//! # Ok(())
//! # }
//! ```

mod distance;
mod histogram;
pub mod kde;

use std::collections::BTreeMap;

use ndarray::Zip;

use crate::table::{FeatureTable, RowKey, TableError};
use crate::volume::{LabelMap, PatchMap, Volume};
use crate::Idx3d;

pub use distance::DistanceExtractor;
pub use histogram::KdeHistogramExtractor;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 特征提取错误.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// 输入体数据形状不一致.
    #[error("shape mismatch: {what} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        /// 出错的输入.
        what: &'static str,
        /// 期望形状 (取自数值体数据).
        expected: Idx3d,
        /// 实际形状.
        found: Idx3d,
    },

    /// 直方图区间非法.
    #[error("invalid histogram range [{lower}, {upper}]")]
    InvalidRange {
        /// 下限.
        lower: i32,
        /// 上限.
        upper: i32,
    },

    /// patch 样本中含 NaN 或无穷大, 无法估计密度.
    #[error("cannot estimate density: {count} non-finite samples")]
    NonFiniteSamples {
        /// 非有限样本个数.
        count: usize,
    },

    /// 特征表错误.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// 一次提取的输入: 数值体数据 (CT 或距离图), 标签图和 patch 图.
///
/// 三者形状一致由构造函数保证.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorInput<'a> {
    values: &'a Volume<f32>,
    labels: &'a LabelMap,
    patches: &'a PatchMap,
}

impl<'a> ExtractorInput<'a> {
    /// 构造输入. 形状不一致时返回 `Err(FeatureError::ShapeMismatch)`.
    pub fn new(
        values: &'a Volume<f32>,
        labels: &'a LabelMap,
        patches: &'a PatchMap,
    ) -> Result<Self, FeatureError> {
        let expected = values.shape();
        if !values.same_shape(labels) {
            return Err(FeatureError::ShapeMismatch {
                what: "label map",
                expected,
                found: labels.shape(),
            });
        }
        if !values.same_shape(patches) {
            return Err(FeatureError::ShapeMismatch {
                what: "patch map",
                expected,
                found: patches.shape(),
            });
        }
        Ok(Self {
            values,
            labels,
            patches,
        })
    }

    /// 按 patch 标签升序收集样本值.
    ///
    /// 样本为标签图非零, 且 patch 标签非零的体素.
    pub fn patch_samples(&self) -> Vec<(u32, Vec<f32>)> {
        let mut groups: BTreeMap<u32, Vec<f32>> = BTreeMap::new();
        Zip::from(self.values.data())
            .and(self.labels.data())
            .and(self.patches.data())
            .for_each(|&v, &l, &p| {
                if l != 0 && p != 0 {
                    groups.entry(p).or_default().push(v);
                }
            });
        groups.into_iter().collect()
    }
}

/// 特征提取器.
pub trait FeatureExtractor: Sync {
    /// 本提取器产生的特征列名.
    fn columns(&self) -> Vec<String>;

    /// 由单个 patch 的样本计算一行特征, 与 [`Self::columns`] 一一对应.
    ///
    /// `samples` 为空时各列均为未定义值.
    fn patch_features(&self, samples: &[f32]) -> Result<Vec<Option<f64>>, FeatureError>;

    /// 计算本提取器的单独特征表. 行按 patch 标签升序,
    /// 区域和类型均为未定义值.
    fn extract(&self, input: &ExtractorInput) -> Result<FeatureTable, FeatureError> {
        let groups = input.patch_samples();

        #[cfg(feature = "rayon")]
        let rows: Vec<Vec<Option<f64>>> = groups
            .par_iter()
            .map(|(_, samples)| self.patch_features(samples))
            .collect::<Result<_, _>>()?;
        #[cfg(not(feature = "rayon"))]
        let rows: Vec<Vec<Option<f64>>> = groups
            .iter()
            .map(|(_, samples)| self.patch_features(samples))
            .collect::<Result<_, _>>()?;

        let mut table = FeatureTable::with_columns(self.columns());
        for ((label, _), row) in groups.iter().zip(rows) {
            table.push_row(RowKey::undefined(*label), row)?;
        }
        log::debug!(
            "extracted {} rows x {} columns",
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }

    /// 计算特征并合并进 `prior`, 返回新表. `prior` 不被修改.
    fn fit(&self, input: &ExtractorInput, prior: &FeatureTable) -> Result<FeatureTable, FeatureError> {
        let own = self.extract(input)?;
        Ok(prior.merge(&own))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{ChestRegion, ChestType};
    use ndarray::{arr3, Array3};

    /// 2x2x1 示例: 强度 {5, 6, 7, 8}, 距离 {1, 2, 3, 4}, 标签图与 patch 图全为 1.
    fn example() -> (Volume<f32>, Volume<f32>, LabelMap, PatchMap) {
        // (z, h, w): 原例中 [x, y, 0] 对应这里的 (0, y, x).
        let ct = arr3(&[[[5.0f32, 6.0], [7.0, 8.0]]]);
        let dist = arr3(&[[[1.0f32, 3.0], [2.0, 4.0]]]);
        (
            Volume::from_array(ct),
            Volume::from_array(dist),
            LabelMap::from_array(Array3::ones((1, 2, 2))),
            PatchMap::from_array(Array3::ones((1, 2, 2))),
        )
    }

    #[test]
    fn test_shape_mismatch() {
        let (ct, _, lm, _) = example();
        let patches = PatchMap::from_array(Array3::ones((1, 2, 3)));
        let err = ExtractorInput::new(&ct, &lm, &patches).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::ShapeMismatch {
                what: "patch map",
                ..
            }
        ));

        let lm = LabelMap::from_array(Array3::ones((2, 2, 1)));
        let err = ExtractorInput::new(&ct, &lm, &patches).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::ShapeMismatch {
                what: "label map",
                ..
            }
        ));
    }

    #[test]
    fn test_patch_samples_skip_unlabeled_and_background() {
        let values = Volume::from_array(arr3(&[[[1.0f32, 2.0, 3.0, 4.0]]]));
        let lm = LabelMap::from_array(arr3(&[[[1u16, 0, 1, 1]]]));
        let patches = PatchMap::from_array(arr3(&[[[2u32, 2, 0, 1]]]));
        let input = ExtractorInput::new(&values, &lm, &patches).unwrap();
        assert_eq!(input.patch_samples(), vec![(1, vec![4.0]), (2, vec![1.0])]);
    }

    #[test]
    fn test_documented_example_both_orders() {
        let (ct, dist, lm, patches) = example();
        let dist_in = ExtractorInput::new(&dist, &lm, &patches).unwrap();
        let ct_in = ExtractorInput::new(&ct, &lm, &patches).unwrap();

        let dist_extractor = DistanceExtractor::new(ChestRegion::WholeLung, ChestType::UndefinedType);
        let hist_extractor = KdeHistogramExtractor::new(5, 8).unwrap();

        let empty = FeatureTable::new();
        let dist_first = dist_extractor.fit(&dist_in, &empty).unwrap();
        let dist_then_hist = hist_extractor.fit(&ct_in, &dist_first).unwrap();

        let hist_first = hist_extractor.fit(&ct_in, &empty).unwrap();
        let hist_then_dist = dist_extractor.fit(&dist_in, &hist_first).unwrap();

        let key = RowKey::undefined(1);
        assert_eq!(key.region, ChestRegion::UndefinedRegion);
        assert_eq!(key.ty, ChestType::UndefinedType);

        // 未归一化的核密度为 hu5 = hu8 = 0.23255479542667767,
        // hu6 = hu7 = 0.25565358411460765, 四者之和约 0.976; 归一化后除以该和.
        let (raw_edge, raw_mid) = (0.23255479542667767, 0.25565358411460765);
        let raw_sum = 2.0 * (raw_edge + raw_mid);
        let expected = [
            ("WholeLungDistance", 2.5),
            ("hu5", raw_edge / raw_sum),
            ("hu6", raw_mid / raw_sum),
            ("hu7", raw_mid / raw_sum),
            ("hu8", raw_edge / raw_sum),
        ];
        for table in [&dist_then_hist, &hist_then_dist] {
            assert_eq!(table.len(), 1);
            assert_eq!(table.keys(), [key]);
            for (col, value) in expected {
                let got = table.get(&key, col).unwrap();
                assert!((got - value).abs() < 1e-12, "{col}: {got} != {value}");
            }
            let hist_sum: f64 = ["hu5", "hu6", "hu7", "hu8"]
                .iter()
                .map(|c| table.get(&key, c).unwrap())
                .sum();
            assert!((hist_sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_merge_commutes_for_disjoint_columns() {
        // 两个 patch, 部分体素未标注.
        let ct = Volume::from_array(arr3(&[[[-900.0f32, -850.0, -700.0], [-820.0, -880.0, -760.0]]]));
        let dist = Volume::from_array(arr3(&[[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]]));
        let lm = LabelMap::from_array(arr3(&[[[1u16, 1, 1], [1, 0, 1]]]));
        let patches = PatchMap::from_array(arr3(&[[[3u32, 3, 7], [3, 7, 7]]]));

        let d = DistanceExtractor::new(ChestRegion::UndefinedRegion, ChestType::Airway);
        let h = KdeHistogramExtractor::new(-900, -700).unwrap();
        let d_in = ExtractorInput::new(&dist, &lm, &patches).unwrap();
        let h_in = ExtractorInput::new(&ct, &lm, &patches).unwrap();

        let a = h.fit(&h_in, &d.fit(&d_in, &FeatureTable::new()).unwrap()).unwrap();
        let b = d.fit(&d_in, &h.fit(&h_in, &FeatureTable::new()).unwrap()).unwrap();

        assert_eq!(a.keys(), b.keys());
        assert_eq!(a.len(), 2);
        for key in a.keys() {
            for col in a.columns() {
                assert_eq!(a.get(key, col), b.get(key, col));
            }
        }
        assert_eq!(a.get(&RowKey::undefined(3), "AirwayDistance"), Some(7.0 / 3.0));
        assert_eq!(a.get(&RowKey::undefined(7), "AirwayDistance"), Some(4.5));
    }
}
