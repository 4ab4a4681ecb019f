//! 粒子点集.
//!
//! 粒子是带属性的三维点: 每个点有坐标, 以及若干按点存储的数据数组
//! (尺度, 强度, Hessian 特征向量, `ChestRegion`/`ChestType` 等).
//! 文件格式为 VTK legacy `POLYDATA`, 见 [`vtk`].

pub mod vtk;

pub use vtk::{read_vtk, write_vtk, VtkEncoding};

/// 点集读写错误.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// 底层 I/O 错误.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// 文件内容不符合格式.
    #[error("malformed vtk file: {0}")]
    Malformed(String),

    /// 不支持的数据集或段落.
    #[error("unsupported vtk content: {0}")]
    Unsupported(String),

    /// 文件提前结束.
    #[error("unexpected end of vtk file while reading {0}")]
    UnexpectedEof(&'static str),

    /// 数组长度与点数不一致.
    #[error("array `{name}` has {found} tuples, expected {expected}")]
    TupleCount {
        /// 数组名.
        name: String,
        /// 期望元组数.
        expected: usize,
        /// 实际元组数.
        found: usize,
    },
}

/// VTK 数组元素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarType {
    /// `unsigned_char`
    UnsignedChar,
    /// `char`
    Char,
    /// `unsigned_short`
    UnsignedShort,
    /// `short`
    Short,
    /// `unsigned_int`
    UnsignedInt,
    /// `int`
    Int,
    /// `unsigned_long` / `vtktypeuint64`
    UnsignedLong,
    /// `long` / `vtktypeint64`
    Long,
    /// `float`
    #[default]
    Float,
    /// `double`
    Double,
}

impl ScalarType {
    /// 解析 VTK 类型名.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "unsigned_char" | "bit" => Self::UnsignedChar,
            "char" => Self::Char,
            "unsigned_short" => Self::UnsignedShort,
            "short" => Self::Short,
            "unsigned_int" => Self::UnsignedInt,
            "int" | "vtkidtype" => Self::Int,
            "unsigned_long" | "vtktypeuint64" => Self::UnsignedLong,
            "long" | "vtktypeint64" => Self::Long,
            "float" => Self::Float,
            "double" => Self::Double,
            _ => return None,
        })
    }

    /// VTK 类型名.
    pub fn name(self) -> &'static str {
        match self {
            Self::UnsignedChar => "unsigned_char",
            Self::Char => "char",
            Self::UnsignedShort => "unsigned_short",
            Self::Short => "short",
            Self::UnsignedInt => "unsigned_int",
            Self::Int => "int",
            Self::UnsignedLong => "vtktypeuint64",
            Self::Long => "vtktypeint64",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// 二进制编码时每个元素的字节数.
    pub fn size(self) -> usize {
        match self {
            Self::UnsignedChar | Self::Char => 1,
            Self::UnsignedShort | Self::Short => 2,
            Self::UnsignedInt | Self::Int | Self::Float => 4,
            Self::UnsignedLong | Self::Long | Self::Double => 8,
        }
    }
}

/// 按元组存储的数据数组. 值统一以 `f64` 保存, 写出时按 `ty` 转换.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    /// 数组名.
    pub name: String,
    /// 每个元组的分量数.
    pub components: usize,
    /// 元素类型.
    pub ty: ScalarType,
    /// 行优先的值, 长度为 `元组数 * components`.
    pub values: Vec<f64>,
}

impl DataArray {
    /// 构建数组.
    ///
    /// # Panics
    ///
    /// `components` 为 0 或 `values` 长度不是其整数倍时 panic.
    pub fn new(name: impl Into<String>, components: usize, ty: ScalarType, values: Vec<f64>) -> Self {
        assert_ne!(components, 0, "分量数不能为 0");
        assert_eq!(values.len() % components, 0, "值个数必须是分量数的整数倍");
        Self {
            name: name.into(),
            components,
            ty,
            values,
        }
    }

    /// 元组个数.
    #[inline]
    pub fn tuples(&self) -> usize {
        self.values.len() / self.components
    }

    /// 第 `i` 个元组.
    #[inline]
    pub fn tuple(&self, i: usize) -> &[f64] {
        &self.values[i * self.components..(i + 1) * self.components]
    }

    /// 按 `ids` 顺序抽取元组, 组成新数组.
    pub fn select(&self, ids: &[usize]) -> Self {
        let mut values = Vec::with_capacity(ids.len() * self.components);
        for &i in ids {
            values.extend_from_slice(self.tuple(i));
        }
        Self {
            name: self.name.clone(),
            components: self.components,
            ty: self.ty,
            values,
        }
    }
}

/// 粒子点集.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleSet {
    points: Vec<[f64; 3]>,
    point_type: ScalarType,
    point_data: Vec<DataArray>,
    field_data: Vec<DataArray>,
}

impl ParticleSet {
    /// 由坐标创建不带属性的点集.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self {
            points,
            ..Self::default()
        }
    }

    /// 点个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 点坐标.
    #[inline]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// 坐标在文件中的元素类型, 默认 `float`.
    #[inline]
    pub fn point_type(&self) -> ScalarType {
        self.point_type
    }

    /// 设置写出坐标时使用的元素类型.
    pub fn with_point_type(mut self, ty: ScalarType) -> Self {
        self.point_type = ty;
        self
    }

    /// 按点存储的数组.
    #[inline]
    pub fn point_data(&self) -> &[DataArray] {
        &self.point_data
    }

    /// 数据集级别的数组 (field data).
    #[inline]
    pub fn field_data(&self) -> &[DataArray] {
        &self.field_data
    }

    /// 按名称查找点数组.
    pub fn point_array(&self, name: &str) -> Option<&DataArray> {
        self.point_data.iter().find(|a| a.name == name)
    }

    /// 添加 (或替换同名) 点数组. 元组数必须等于点数.
    pub fn set_point_array(&mut self, array: DataArray) -> Result<(), GeometryError> {
        let found = array.tuples();
        if found != self.len() {
            return Err(GeometryError::TupleCount {
                name: array.name,
                expected: self.len(),
                found,
            });
        }
        match self.point_data.iter_mut().find(|a| a.name == array.name) {
            Some(slot) => *slot = array,
            None => self.point_data.push(array),
        }
        Ok(())
    }

    /// 添加 field 数组.
    pub fn push_field_array(&mut self, array: DataArray) {
        self.field_data.push(array);
    }

    /// 按 `ids` 抽取子点集. 所有点数组随之抽取;
    /// 元组数等于点数的 field 数组同样被抽取, 其余原样保留.
    pub fn select(&self, ids: &[usize]) -> Self {
        let n = self.len();
        Self {
            points: ids.iter().map(|&i| self.points[i]).collect(),
            point_type: self.point_type,
            point_data: self.point_data.iter().map(|a| a.select(ids)).collect(),
            field_data: self
                .field_data
                .iter()
                .map(|a| if a.tuples() == n { a.select(ids) } else { a.clone() })
                .collect(),
        }
    }

    /// 依次拼接多个点集.
    ///
    /// 只保留所有输入都具有 (同名且分量数相同) 的点数组; field 数组取第一个输入的.
    pub fn concat<'a, I: IntoIterator<Item = &'a ParticleSet>>(sets: I) -> Self {
        let sets: Vec<&ParticleSet> = sets.into_iter().collect();
        let Some(first) = sets.first() else {
            return Self::default();
        };

        let mut out = Self {
            points: sets.iter().flat_map(|s| s.points.iter().copied()).collect(),
            point_type: first.point_type,
            point_data: Vec::new(),
            field_data: first.field_data.clone(),
        };
        for proto in first.point_data.iter() {
            let parts: Option<Vec<&DataArray>> = sets
                .iter()
                .map(|s| {
                    s.point_array(&proto.name)
                        .filter(|a| a.components == proto.components)
                })
                .collect();
            if let Some(parts) = parts {
                out.point_data.push(DataArray {
                    name: proto.name.clone(),
                    components: proto.components,
                    ty: proto.ty,
                    values: parts.iter().flat_map(|a| a.values.iter().copied()).collect(),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParticleSet {
        let mut p = ParticleSet::from_points(vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        p.set_point_array(DataArray::new("scale", 1, ScalarType::Float, vec![1.0, 2.0, 3.0]))
            .unwrap();
        p.set_point_array(DataArray::new(
            "hevec0",
            3,
            ScalarType::Float,
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        ))
        .unwrap();
        p.push_field_array(DataArray::new("spacing", 3, ScalarType::Double, vec![0.5, 0.5, 1.0]));
        p
    }

    #[test]
    fn test_select() {
        let p = sample();
        let s = p.select(&[2, 0]);
        assert_eq!(s.points(), [[4.0, 5.0, 6.0], [0.0, 0.0, 0.0]]);
        assert_eq!(s.point_array("scale").unwrap().values, [3.0, 1.0]);
        assert_eq!(s.point_array("hevec0").unwrap().tuple(0), [0.0, 0.0, 1.0]);
        // 只有一个元组的 field 数组不随点抽取.
        assert_eq!(s.field_data()[0].values, [0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_tuple_count_checked() {
        let mut p = sample();
        let err = p
            .set_point_array(DataArray::new("bad", 1, ScalarType::Int, vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, GeometryError::TupleCount { expected: 3, found: 1, .. }));
        assert_eq!(err.to_string(), "array `bad` has 1 tuples, expected 3");
    }

    #[test]
    fn test_point_type_follows_subsets() {
        let p = sample().with_point_type(ScalarType::Double);
        assert_eq!(p.select(&[1]).point_type(), ScalarType::Double);
        assert_eq!(ParticleSet::concat([&p, &p]).point_type(), ScalarType::Double);
        assert_eq!(sample().point_type(), ScalarType::Float);
    }

    #[test]
    fn test_concat_keeps_common_arrays() {
        let a = sample();
        let mut b = ParticleSet::from_points(vec![[9.0, 9.0, 9.0]]);
        b.set_point_array(DataArray::new("scale", 1, ScalarType::Float, vec![9.0]))
            .unwrap();
        let c = ParticleSet::concat([&a, &b]);
        assert_eq!(c.len(), 4);
        assert_eq!(c.point_data().len(), 1);
        assert_eq!(c.point_array("scale").unwrap().values, [1.0, 2.0, 3.0, 9.0]);
        assert!(ParticleSet::concat(std::iter::empty()).is_empty());
    }
}
