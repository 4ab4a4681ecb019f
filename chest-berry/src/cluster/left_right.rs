//! 左右肺粒子标注.

use super::{ClusterError, ClusterMethod, ClusterParticles, MiniBatchKMeansOptions, DEFAULT_SEED};
use crate::consts::{ChestRegion, ChestType};
use crate::geometry::{DataArray, ParticleSet, ScalarType};

/// 区域数组名.
pub const CHEST_REGION_ARRAY: &str = "ChestRegion";

/// 类型数组名.
pub const CHEST_TYPE_ARRAY: &str = "ChestType";

/// 标注结果.
#[derive(Debug, Clone)]
pub struct LeftRightParticles {
    /// 左肺粒子.
    pub left: ParticleSet,
    /// 右肺粒子.
    pub right: ParticleSet,
    /// 两侧按簇标签顺序拼接.
    pub both: ParticleSet,
}

/// 将粒子分为两簇, 并标注为左肺与右肺.
///
/// 中心第一坐标较大的簇为左肺. 两侧的 `ChestType` 都是 `Vessel`.
#[derive(Debug, Clone, Copy)]
pub struct LeftRightLabeling {
    seed: u64,
}

impl Default for LeftRightLabeling {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl LeftRightLabeling {
    /// 使用给定随机种子.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// 执行标注.
    pub fn execute(&self, set: &ParticleSet) -> Result<LeftRightParticles, ClusterError> {
        let method = ClusterMethod::MiniBatchKMeans(MiniBatchKMeansOptions {
            n_clusters: 2,
            ..MiniBatchKMeansOptions::default()
        });
        let (clustering, _) = ClusterParticles::new(method, self.seed).cluster(set)?;

        let first_is_left = clustering.centroids[(0, 0)] > clustering.centroids[(1, 0)];
        let mut sides = [
            set.select(&clustering.members(0)),
            set.select(&clustering.members(1)),
        ];
        let regions = if first_is_left {
            [ChestRegion::LeftLung, ChestRegion::RightLung]
        } else {
            [ChestRegion::RightLung, ChestRegion::LeftLung]
        };

        for (side, region) in sides.iter_mut().zip(regions) {
            tag(side, region, ChestType::Vessel)?;
        }
        let both = ParticleSet::concat(sides.iter());
        let [first, second] = sides;
        let (left, right) = if first_is_left {
            (first, second)
        } else {
            (second, first)
        };
        log::info!(
            "labeled {} left and {} right particles",
            left.len(),
            right.len()
        );
        Ok(LeftRightParticles { left, right, both })
    }
}

/// 为每个点加上 `ChestRegion` 与 `ChestType` 数组.
fn tag(set: &mut ParticleSet, region: ChestRegion, ty: ChestType) -> Result<(), ClusterError> {
    let n = set.len();
    set.set_point_array(DataArray::new(
        CHEST_REGION_ARRAY,
        1,
        ScalarType::UnsignedChar,
        vec![region.code() as f64; n],
    ))?;
    set.set_point_array(DataArray::new(
        CHEST_TYPE_ARRAY,
        1,
        ScalarType::UnsignedChar,
        vec![ty.code() as f64; n],
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lungs() -> ParticleSet {
        let mut points = Vec::new();
        for i in 0..15 {
            let t = i as f64;
            // 第一坐标较小的一侧.
            points.push([-120.0 + t * 0.3, 10.0 + t * 0.2, -40.0 - t * 0.1]);
            // 第一坐标较大的一侧.
            points.push([130.0 - t * 0.2, 60.0 + t * 0.2, -80.0 - t * 0.1]);
        }
        ParticleSet::from_points(points)
    }

    #[test]
    fn test_larger_first_coordinate_is_left() {
        let out = LeftRightLabeling::default().execute(&lungs()).unwrap();
        assert_eq!(out.left.len(), 15);
        assert_eq!(out.right.len(), 15);
        assert!(out.left.points().iter().all(|p| p[0] > 0.0));
        assert!(out.right.points().iter().all(|p| p[0] < 0.0));

        let region = out.left.point_array(CHEST_REGION_ARRAY).unwrap();
        assert!(region.values.iter().all(|v| *v == ChestRegion::LeftLung.code() as f64));
        let region = out.right.point_array(CHEST_REGION_ARRAY).unwrap();
        assert!(region.values.iter().all(|v| *v == ChestRegion::RightLung.code() as f64));
        for side in [&out.left, &out.right] {
            let ty = side.point_array(CHEST_TYPE_ARRAY).unwrap();
            assert!(ty.values.iter().all(|v| *v == ChestType::Vessel.code() as f64));
        }

        assert_eq!(out.both.len(), 30);
        assert_eq!(out.both.point_array(CHEST_REGION_ARRAY).unwrap().tuples(), 30);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = LeftRightLabeling::new(5).execute(&lungs()).unwrap();
        let b = LeftRightLabeling::new(5).execute(&lungs()).unwrap();
        assert_eq!(a.both, b.both);
    }

    #[test]
    fn test_single_point_rejected() {
        let err = LeftRightLabeling::default()
            .execute(&ParticleSet::from_points(vec![[1.0, 2.0, 3.0]]))
            .unwrap_err();
        assert!(matches!(err, ClusterError::TooFewPoints { needed: 2, found: 1 }));
    }
}
