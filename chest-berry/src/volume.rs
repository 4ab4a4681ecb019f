//! 三维体数据: CT 扫描, 距离图, 胸部标签图, patch 图.
//!
//! 所有体数据均以 `(z, h, w)` 顺序存储. nifti 文件中的 `[W, H, z]`
//! 会在加载时被转换.

use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView3, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::{region_of, type_of, ChestRegion, ChestType};
use crate::Idx3d;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 体数据加载错误.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// nifti 读取错误.
    #[error("failed to read nifti volume: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 数据不是三维的. 参数为实际维数.
    #[error("expected a 3-D volume, got {0} dimensions")]
    NotThreeDimensional(usize),

    /// 数组形状错误.
    #[error("invalid volume shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// 带 nifti header 的三维体数据.
#[derive(Debug, Clone)]
pub struct Volume<T> {
    header: BoxedHeader,
    data: Array3<T>,
}

/// CT 扫描, HU 值以 `f32` 保存.
pub type CtScan = Volume<f32>;

/// 到某结构边界的距离图 (单位: 毫米).
pub type DistanceMap = Volume<f32>;

/// 胸部标签图. 体素值按 `(type << 8) | region` 编码.
pub type LabelMap = Volume<u16>;

/// patch 图. `0` 为背景, 其他值为 patch 标签.
pub type PatchMap = Volume<u32>;

impl<T> Volume<T> {
    /// 直接由 `(z, h, w)` 顺序的数组创建, 使用默认 header (各向同性 1mm).
    ///
    /// 该方法主要用于合成数据和测试. header 的 `dim` 字段为 `u16`,
    /// 某一维超过 `u16::MAX` 时该字段取 `u16::MAX`; 形状始终以数组为准.
    pub fn from_array(data: Array3<T>) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        let (z, h, w) = data.dim();
        let dim = |n: usize| {
            u16::try_from(n).unwrap_or_else(|_| {
                log::warn!("axis length {n} does not fit a nifti header, stored as {}", u16::MAX);
                u16::MAX
            })
        };
        header.dim = [3, dim(w), dim(h), dim(z), 1, 1, 1, 1];
        header.pixdim = [1.0; 8];
        Self { header, data }
    }

    /// 获取 header 部分.
    #[inline]
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// 获取数据形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取数据体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 获取单个体素分辨率 `[z, h, w]`, 以毫米为单位.
    #[inline]
    pub fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header.pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    pub fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// 获取 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ndarray::ArrayView2<'_, T> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 两个体数据形状是否一致.
    #[inline]
    pub fn same_shape<U>(&self, other: &Volume<U>) -> bool {
        self.shape() == other.shape()
    }
}

impl<T> Index<Idx3d> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

macro_rules! impl_volume_open {
    ($t: ty) => {
        impl Volume<$t> {
            /// 打开 nii 文件格式的三维体数据. `path` 为 nii 文件的本地路径.
            pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VolumeError> {
                let obj = ReaderOptions::new().read_file(path.as_ref())?;
                let header = Box::new(obj.header().clone());

                let data = obj.into_volume().into_ndarray::<$t>()?;
                if data.ndim() != 3 {
                    return Err(VolumeError::NotThreeDimensional(data.ndim()));
                }

                // [W, H, z] -> [z, H, W].
                // hint: 原第一维向下增长, 原第二维向右增长.
                let data = data
                    .permuted_axes([2, 1, 0].as_slice())
                    .into_dimensionality::<Ix3>()?;
                let data = if data.is_standard_layout() {
                    data
                } else {
                    data.as_standard_layout().into_owned()
                };

                log::debug!(
                    "opened {:?} with shape {:?}",
                    path.as_ref(),
                    data.dim()
                );
                Ok(Self { header, data })
            }
        }
    };
}

impl_volume_open!(f32);
impl_volume_open!(u16);
impl_volume_open!(u32);

impl LabelMap {
    /// 体素 `pos` 的区域.
    #[inline]
    pub fn region_at(&self, pos: Idx3d) -> ChestRegion {
        region_of(self[pos])
    }

    /// 体素 `pos` 的类型.
    #[inline]
    pub fn type_at(&self, pos: Idx3d) -> ChestType {
        type_of(self[pos])
    }

    /// 获取标签图中非零 (即被标注) 的体素个数.
    pub fn labeled_count(&self) -> usize {
        self.data.iter().filter(|p| **p != 0).count()
    }
}

impl PatchMap {
    /// 收集所有非背景 patch 标签, 升序排列且去重.
    pub fn labels(&self) -> Vec<u32> {
        use itertools::Itertools;
        self.data
            .iter()
            .copied()
            .filter(|p| *p != 0)
            .sorted_unstable()
            .dedup()
            .collect()
    }
}
