//! 距离统计特征.

use super::{FeatureError, FeatureExtractor};
use crate::consts::{ChestRegion, ChestType};

/// 距离特征提取器.
///
/// 对每个 patch 求样本距离的平均值. 列名为 `<Region><Type>Distance`,
/// 其中未定义的部分被省略, 例如 `WholeLungDistance`.
#[derive(Debug, Clone, Copy)]
pub struct DistanceExtractor {
    region: ChestRegion,
    ty: ChestType,
}

impl DistanceExtractor {
    /// `region` 和 `ty` 为距离图所度量的结构.
    #[inline]
    pub fn new(region: ChestRegion, ty: ChestType) -> Self {
        Self { region, ty }
    }

    /// 特征列名.
    pub fn column_name(&self) -> String {
        let mut name = String::new();
        if !self.region.is_undefined() {
            name.push_str(self.region.name());
        }
        if !self.ty.is_undefined() {
            name.push_str(self.ty.name());
        }
        name.push_str("Distance");
        name
    }
}

impl FeatureExtractor for DistanceExtractor {
    fn columns(&self) -> Vec<String> {
        vec![self.column_name()]
    }

    fn patch_features(&self, samples: &[f32]) -> Result<Vec<Option<f64>>, FeatureError> {
        if samples.is_empty() {
            return Ok(vec![None]);
        }
        let sum: f64 = samples.iter().map(|&s| f64::from(s)).sum();
        Ok(vec![Some(sum / samples.len() as f64)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_name() {
        let name = |r, t| DistanceExtractor::new(r, t).column_name();
        assert_eq!(
            name(ChestRegion::WholeLung, ChestType::UndefinedType),
            "WholeLungDistance"
        );
        assert_eq!(
            name(ChestRegion::LeftLung, ChestType::Vessel),
            "LeftLungVesselDistance"
        );
        assert_eq!(
            name(ChestRegion::UndefinedRegion, ChestType::UndefinedType),
            "Distance"
        );
    }

    #[test]
    fn test_mean_distance() {
        let d = DistanceExtractor::new(ChestRegion::WholeLung, ChestType::UndefinedType);
        assert_eq!(d.patch_features(&[1.0, 2.0, 3.0, 4.0]).unwrap(), vec![Some(2.5)]);
        assert_eq!(d.patch_features(&[]).unwrap(), vec![None]);
    }
}
