//! 特征表.
//!
//! 每一行对应一个样本, 以 `(patch_label, ChestRegion, ChestType)` 为键.
//! 特征列由各个特征提取器逐步添加. 特征表是不可变值:
//! 合并操作总是返回新表, 不修改任何输入.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use crate::consts::{ChestRegion, ChestType};

/// 键列名.
pub const PATCH_LABEL_COLUMN: &str = "patch_label";
/// 键列名.
pub const REGION_COLUMN: &str = "ChestRegion";
/// 键列名.
pub const TYPE_COLUMN: &str = "ChestType";

/// 特征表读写错误.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// 底层 CSV 错误.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// 底层 I/O 错误.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// 缺少键列.
    #[error("missing key column `{0}`")]
    MissingKeyColumn(&'static str),

    /// 单元格无法解析.
    #[error("row {row}: cannot parse `{value}` in column `{column}`")]
    BadCell {
        /// 数据行号 (从 0 开始, 不含表头).
        row: usize,
        /// 列名.
        column: String,
        /// 原始文本.
        value: String,
    },

    /// 同一个键出现了两次.
    #[error("duplicated row key {0:?}")]
    DuplicatedKey(RowKey),
}

/// 特征表行键.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RowKey {
    /// patch 标签.
    pub patch_label: u32,
    /// 胸部区域.
    pub region: ChestRegion,
    /// 胸部类型.
    pub ty: ChestType,
}

impl RowKey {
    /// 构造键.
    #[inline]
    pub fn new(patch_label: u32, region: ChestRegion, ty: ChestType) -> Self {
        Self {
            patch_label,
            region,
            ty,
        }
    }

    /// 区域和类型均未确定的键.
    #[inline]
    pub fn undefined(patch_label: u32) -> Self {
        Self::new(
            patch_label,
            ChestRegion::UndefinedRegion,
            ChestType::UndefinedType,
        )
    }
}

/// 特征表.
///
/// `values[i][j]` 为第 `i` 行在第 `j` 个特征列上的值, `None` 代表未定义.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    keys: Vec<RowKey>,
    values: Vec<Vec<Option<f64>>>,
    index: HashMap<RowKey, usize>,
}

impl FeatureTable {
    /// 创建空表.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定特征列创建空表.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// 追加一行. `values` 与特征列一一对应.
    ///
    /// 如果键已存在则返回错误, 表不变.
    ///
    /// # Panics
    ///
    /// `values` 长度与列数不一致时 panic.
    pub fn push_row(&mut self, key: RowKey, values: Vec<Option<f64>>) -> Result<(), TableError> {
        assert_eq!(values.len(), self.columns.len(), "行长度必须与列数一致");
        if self.index.contains_key(&key) {
            return Err(TableError::DuplicatedKey(key));
        }
        self.index.insert(key, self.keys.len());
        self.keys.push(key);
        self.values.push(values);
        Ok(())
    }

    /// 特征列名 (不含键列).
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 行键, 按插入顺序排列.
    #[inline]
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// 是否为空表.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 列 `column` 的位置.
    #[inline]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// 是否含有键 `key`.
    #[inline]
    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.index.contains_key(key)
    }

    /// 获取 `key` 行 `column` 列的值. 行或列不存在, 或值未定义时返回 `None`.
    pub fn get(&self, key: &RowKey, column: &str) -> Option<f64> {
        let row = *self.index.get(key)?;
        let col = self.column_index(column)?;
        self.values[row][col]
    }

    /// 获取 `key` 行的所有值.
    pub fn row(&self, key: &RowKey) -> Option<&[Option<f64>]> {
        self.index.get(key).map(|&i| self.values[i].as_slice())
    }

    /// 按插入顺序迭代 `(键, 行值)`.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&RowKey, &[Option<f64>])> {
        self.keys.iter().zip(self.values.iter().map(Vec::as_slice))
    }

    /// 以 `self` 为基础合并 `other`, 返回新表 (外连接).
    ///
    /// 1. 行按键合并. 两表都有的键, `other` 的列被添加到该行上, 同名列被覆盖;
    /// 2. 仅 `other` 有的键追加到末尾, `self` 独有的列置为未定义;
    /// 3. 行序为首次出现的顺序, 列序为 `self` 的列之后接 `other` 的新列.
    pub fn merge(&self, other: &FeatureTable) -> FeatureTable {
        let mut columns = self.columns.clone();
        let col_map: Vec<usize> = other
            .columns
            .iter()
            .map(|c| match columns.iter().position(|x| x == c) {
                Some(i) => i,
                None => {
                    columns.push(c.clone());
                    columns.len() - 1
                }
            })
            .collect();

        let width = columns.len();
        let mut values: Vec<Vec<Option<f64>>> = self
            .values
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.resize(width, None);
                row
            })
            .collect();
        let mut keys = self.keys.clone();
        let mut index = self.index.clone();

        for (key, row) in other.iter() {
            let slot = match index.get(key) {
                Some(&i) => i,
                None => {
                    index.insert(*key, keys.len());
                    keys.push(*key);
                    values.push(vec![None; width]);
                    keys.len() - 1
                }
            };
            for (j, v) in row.iter().enumerate() {
                // 未定义值不覆盖已有值.
                if v.is_some() {
                    values[slot][col_map[j]] = *v;
                }
            }
        }

        FeatureTable {
            columns,
            keys,
            values,
            index,
        }
    }

    /// 写出 CSV. 表头为三个键列加全部特征列, 未定义值写为空串.
    pub fn write_csv<W: io::Write>(&self, w: W) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_writer(w);
        let header = [PATCH_LABEL_COLUMN, REGION_COLUMN, TYPE_COLUMN]
            .into_iter()
            .chain(self.columns.iter().map(String::as_str));
        writer.write_record(header)?;

        for (key, row) in self.iter() {
            let mut record = Vec::with_capacity(3 + row.len());
            record.push(key.patch_label.to_string());
            record.push(key.region.name().to_string());
            record.push(key.ty.name().to_string());
            record.extend(row.iter().map(|v| v.map_or_else(String::new, |f| f.to_string())));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// 写出 CSV 文件.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv(io::BufWriter::new(file))
    }

    /// 读取 CSV. 表头中必须包含三个键列, 其余列均视为特征列.
    ///
    /// 未知区域/类型名被映射为未定义值.
    pub fn read_csv<R: io::Read>(r: R) -> Result<Self, TableError> {
        let mut reader = csv::Reader::from_reader(r);
        let header = reader.headers()?.clone();
        let find = |name: &'static str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or(TableError::MissingKeyColumn(name))
        };
        let (pl, rg, ty) = (
            find(PATCH_LABEL_COLUMN)?,
            find(REGION_COLUMN)?,
            find(TYPE_COLUMN)?,
        );
        let feature_cols: Vec<usize> = (0..header.len())
            .filter(|i| ![pl, rg, ty].contains(i))
            .collect();

        let mut table =
            FeatureTable::with_columns(feature_cols.iter().map(|&i| header[i].to_string()));

        for (n, record) in reader.records().enumerate() {
            let record = record?;
            let bad = |i: usize| TableError::BadCell {
                row: n,
                column: header[i].to_string(),
                value: record[i].to_string(),
            };
            let patch_label = parse_patch_label(&record[pl]).ok_or_else(|| bad(pl))?;
            let key = RowKey::new(
                patch_label,
                ChestRegion::from_name(&record[rg]),
                ChestType::from_name(&record[ty]),
            );
            let mut values = Vec::with_capacity(feature_cols.len());
            for &i in feature_cols.iter() {
                let cell = record[i].trim();
                if cell.is_empty() {
                    values.push(None);
                } else {
                    values.push(Some(cell.parse::<f64>().map_err(|_| bad(i))?));
                }
            }
            table.push_row(key, values)?;
        }
        Ok(table)
    }

    /// 读取 CSV 文件.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::read_csv(io::BufReader::new(file))
    }
}

/// patch 标签可能以浮点形式写出 (例如 `1.0`).
fn parse_patch_label(s: &str) -> Option<u32> {
    let s = s.trim();
    s.parse::<u32>().ok().or_else(|| {
        let f = s.parse::<f64>().ok()?;
        (f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64).then_some(f as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(cols: &[&str], rows: &[(u32, &[f64])]) -> FeatureTable {
        let mut t = FeatureTable::with_columns(cols.iter().copied());
        for (label, vals) in rows {
            t.push_row(
                RowKey::undefined(*label),
                vals.iter().copied().map(Some).collect(),
            )
            .unwrap();
        }
        t
    }

    #[test]
    fn test_duplicated_key_rejected() {
        let mut t = table(&["a"], &[(1, &[1.0])]);
        let err = t.push_row(RowKey::undefined(1), vec![Some(2.0)]).unwrap_err();
        assert!(matches!(err, TableError::DuplicatedKey(_)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_merge_into_empty() {
        let t = table(&["a"], &[(1, &[1.0]), (2, &[2.0])]);
        let m = FeatureTable::new().merge(&t);
        assert_eq!(m, t);
    }

    #[test]
    fn test_merge_outer_join() {
        let a = table(&["a"], &[(1, &[1.0]), (2, &[2.0])]);
        let b = table(&["b"], &[(2, &[20.0]), (3, &[30.0])]);
        let m = a.merge(&b);

        assert_eq!(m.columns(), ["a", "b"]);
        let labels: Vec<u32> = m.keys().iter().map(|k| k.patch_label).collect();
        assert_eq!(labels, [1, 2, 3]);
        assert_eq!(m.get(&RowKey::undefined(1), "a"), Some(1.0));
        assert_eq!(m.get(&RowKey::undefined(1), "b"), None);
        assert_eq!(m.get(&RowKey::undefined(2), "b"), Some(20.0));
        assert_eq!(m.get(&RowKey::undefined(3), "a"), None);
        assert_eq!(m.get(&RowKey::undefined(3), "b"), Some(30.0));

        // 输入不被修改.
        assert_eq!(a.columns(), ["a"]);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_merge_overwrites_same_column() {
        let a = table(&["a", "b"], &[(1, &[1.0, 5.0])]);
        let b = table(&["b"], &[(1, &[7.0])]);
        let m = a.merge(&b);
        assert_eq!(m.columns(), ["a", "b"]);
        assert_eq!(m.get(&RowKey::undefined(1), "b"), Some(7.0));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_merge_never_duplicates_keys() {
        let a = table(&["a"], &[(1, &[1.0]), (2, &[2.0])]);
        let m = a.merge(&a).merge(&a);
        assert_eq!(m.len(), 2);
        let mut keys = m.keys().to_vec();
        keys.dedup();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_distinct_region_is_distinct_row() {
        let mut a = FeatureTable::with_columns(["a"]);
        a.push_row(RowKey::undefined(1), vec![Some(1.0)]).unwrap();
        a.push_row(
            RowKey::new(1, ChestRegion::LeftLung, ChestType::UndefinedType),
            vec![Some(2.0)],
        )
        .unwrap();
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_csv_round_trip() {
        let a = table(&["a"], &[(1, &[1.5])]);
        let b = table(&["b"], &[(2, &[-3.25])]);
        let m = a.merge(&b);

        let mut buf = Vec::new();
        m.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("patch_label,ChestRegion,ChestType,a,b\n"));
        assert!(text.contains("1,UndefinedRegion,UndefinedType,1.5,\n"));

        let back = FeatureTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_csv_unknown_names_and_float_labels() {
        let text = "ChestType,patch_label,ChestRegion,hu5\nFoo,3.0,Bar,0.5\n";
        let t = FeatureTable::read_csv(text.as_bytes()).unwrap();
        assert_eq!(t.columns(), ["hu5"]);
        assert_eq!(t.get(&RowKey::undefined(3), "hu5"), Some(0.5));
    }

    #[test]
    fn test_csv_missing_key_column() {
        let text = "patch_label,ChestRegion,hu5\n1,WholeLung,0.5\n";
        let err = FeatureTable::read_csv(text.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::MissingKeyColumn("ChestType")));
    }
}
