//! VTK legacy `POLYDATA` 读写.
//!
//! 支持 ASCII 与 BINARY (大端) 两种编码. 读取时:
//!
//! - 点坐标来自 `POINTS`;
//! - `POINT_DATA` 下的 `SCALARS`/`VECTORS`/`NORMALS`/`FIELD` 数组成为点数组;
//! - `DATASET` 之后, `POINTS` 之前的 `FIELD` 成为 field 数组;
//! - 拓扑 (`VERTICES` 等) 与 `CELL_DATA` 被读过并丢弃.
//!
//! 写出时每个点生成一个 vertex 单元, 所有点数组以 `FIELD` 形式写出.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{DataArray, GeometryError, ParticleSet, ScalarType};

/// 文件编码.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum VtkEncoding {
    /// 文本.
    Ascii,
    /// 大端二进制.
    #[default]
    Binary,
}

type Result<T> = std::result::Result<T, GeometryError>;

/// 读取 `.vtk` 文件.
pub fn read_vtk<P: AsRef<Path>>(path: P) -> Result<ParticleSet> {
    let bytes = std::fs::read(path.as_ref())?;
    let set = parse_vtk(&bytes)?;
    log::debug!("read {} particles from {:?}", set.len(), path.as_ref());
    Ok(set)
}

/// 写出 `.vtk` 文件.
pub fn write_vtk<P: AsRef<Path>>(set: &ParticleSet, path: P, encoding: VtkEncoding) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    encode_vtk(set, &mut w, encoding)?;
    w.flush()?;
    log::debug!("wrote {} particles to {:?}", set.len(), path.as_ref());
    Ok(())
}

/// 由内存中的字节解析.
pub fn parse_vtk(bytes: &[u8]) -> Result<ParticleSet> {
    let mut s = Scanner { buf: bytes, pos: 0 };

    let magic = s.line().ok_or(GeometryError::UnexpectedEof("header"))?;
    if !magic.starts_with("# vtk DataFile") {
        return Err(GeometryError::Malformed(format!("bad magic line `{magic}`")));
    }
    s.line().ok_or(GeometryError::UnexpectedEof("title"))?;
    let binary = match s.line().map(str::trim) {
        Some(e) if e.eq_ignore_ascii_case("ascii") => false,
        Some(e) if e.eq_ignore_ascii_case("binary") => true,
        Some(e) => return Err(GeometryError::Malformed(format!("unknown encoding `{e}`"))),
        None => return Err(GeometryError::UnexpectedEof("encoding")),
    };
    s.expect("DATASET")?;
    let dataset = s.token().ok_or(GeometryError::UnexpectedEof("dataset"))?;
    if !dataset.eq_ignore_ascii_case("POLYDATA") {
        return Err(GeometryError::Unsupported(format!("dataset `{dataset}`")));
    }

    let mut points: Option<Vec<[f64; 3]>> = None;
    let mut point_type = ScalarType::Float;
    let mut point_data = Vec::new();
    let mut field_data = Vec::new();
    // 当前属性段: None 表示尚未进入 POINT_DATA/CELL_DATA.
    let mut section: Option<Section> = None;

    while let Some(keyword) = s.token() {
        match keyword.to_ascii_uppercase().as_str() {
            "POINTS" => {
                let n = s.number("POINTS count")?;
                let ty = s.scalar_type()?;
                s.skip_line();
                let values = s.values(product(3, n, "POINTS")?, ty, binary)?;
                points = Some(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect());
                point_type = ty;
            }
            "VERTICES" | "LINES" | "POLYGONS" | "TRIANGLE_STRIPS" => {
                let cells = s.number("cell count")?;
                let size = s.number("cell size")?;
                s.skip_line();
                if s.at_keyword("OFFSETS") {
                    // 5.x 布局: OFFSETS 有 cells + 1 个值, CONNECTIVITY 有 size 个值.
                    s.token();
                    let ty = s.scalar_type()?;
                    s.skip_line();
                    let offsets = cells
                        .checked_add(1)
                        .ok_or_else(|| GeometryError::Malformed(format!("cell count {cells} overflows")))?;
                    s.values(offsets, ty, binary)?;
                    s.expect("CONNECTIVITY")?;
                    let ty = s.scalar_type()?;
                    s.skip_line();
                    s.values(size, ty, binary)?;
                } else {
                    s.values(size, ScalarType::Int, binary)?;
                }
            }
            "POINT_DATA" => {
                let n = s.number("POINT_DATA count")?;
                section = Some(Section::Point(n));
            }
            "CELL_DATA" => {
                let n = s.number("CELL_DATA count")?;
                section = Some(Section::Cell(n));
            }
            "FIELD" => {
                s.token().ok_or(GeometryError::UnexpectedEof("FIELD name"))?;
                let count = s.number("FIELD array count")?;
                for _ in 0..count {
                    let name = s
                        .token()
                        .ok_or(GeometryError::UnexpectedEof("FIELD array name"))?
                        .to_owned();
                    let components = s.number("FIELD array components")?;
                    let tuples = s.number("FIELD array tuples")?;
                    let ty = s.scalar_type()?;
                    s.skip_line();
                    let values = s.values(product(components, tuples, "FIELD array")?, ty, binary)?;
                    s.skip_metadata();
                    if components == 0 {
                        continue;
                    }
                    let array = DataArray::new(name, components, ty, values);
                    match section {
                        None => field_data.push(array),
                        Some(Section::Point(_)) => point_data.push(array),
                        Some(Section::Cell(_)) => {}
                    }
                }
            }
            "SCALARS" => {
                let n = section.map(Section::len).ok_or_else(|| {
                    GeometryError::Malformed("SCALARS outside of an attribute section".into())
                })?;
                let rest = s.line().ok_or(GeometryError::UnexpectedEof("SCALARS"))?;
                let mut it = rest.split_whitespace();
                let name = it
                    .next()
                    .ok_or(GeometryError::UnexpectedEof("SCALARS name"))?
                    .to_owned();
                let ty = parse_type(it.next().ok_or(GeometryError::UnexpectedEof("SCALARS type"))?)?;
                let components = match it.next() {
                    Some(c) => c
                        .parse()
                        .map_err(|_| GeometryError::Malformed(format!("bad component count `{c}`")))?,
                    None => 1,
                };
                if components == 0 {
                    return Err(GeometryError::Malformed(format!("SCALARS `{name}` has 0 components")));
                }
                if s.at_keyword("LOOKUP_TABLE") {
                    s.line();
                }
                let values = s.values(product(n, components, "SCALARS")?, ty, binary)?;
                if let Some(Section::Point(_)) = section {
                    point_data.push(DataArray::new(name, components, ty, values));
                }
            }
            "VECTORS" | "NORMALS" => {
                let n = section.map(Section::len).ok_or_else(|| {
                    GeometryError::Malformed(format!("{keyword} outside of an attribute section"))
                })?;
                let name = s
                    .token()
                    .ok_or(GeometryError::UnexpectedEof("array name"))?
                    .to_owned();
                let ty = s.scalar_type()?;
                s.skip_line();
                let values = s.values(product(3, n, "VECTORS")?, ty, binary)?;
                if let Some(Section::Point(_)) = section {
                    point_data.push(DataArray::new(name, 3, ty, values));
                }
            }
            "METADATA" => {
                s.skip_line();
                s.skip_metadata_body();
            }
            other => return Err(GeometryError::Unsupported(format!("section `{other}`"))),
        }
    }

    let points = points.ok_or(GeometryError::UnexpectedEof("POINTS"))?;
    let mut set = ParticleSet::from_points(points).with_point_type(point_type);
    for array in point_data {
        set.set_point_array(array)?;
    }
    for array in field_data {
        set.push_field_array(array);
    }
    Ok(set)
}

/// 将点集编码到 `w`.
pub fn encode_vtk<W: Write>(set: &ParticleSet, w: &mut W, encoding: VtkEncoding) -> Result<()> {
    let binary = encoding == VtkEncoding::Binary;
    let n = set.len();

    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "chest particles")?;
    writeln!(w, "{}", if binary { "BINARY" } else { "ASCII" })?;
    writeln!(w, "DATASET POLYDATA")?;

    if !set.field_data().is_empty() {
        write_field(w, set.field_data(), binary)?;
    }

    writeln!(w, "POINTS {n} {}", set.point_type().name())?;
    let coords: Vec<f64> = set.points().iter().flatten().copied().collect();
    write_values(w, &coords, set.point_type(), 3, binary)?;

    writeln!(w, "VERTICES {n} {}", 2 * n)?;
    let cells: Vec<f64> = (0..n).flat_map(|i| [1.0, i as f64]).collect();
    write_values(w, &cells, ScalarType::Int, 2, binary)?;

    if !set.point_data().is_empty() {
        writeln!(w, "POINT_DATA {n}")?;
        write_field(w, set.point_data(), binary)?;
    }
    Ok(())
}

fn write_field<W: Write>(w: &mut W, arrays: &[DataArray], binary: bool) -> Result<()> {
    writeln!(w, "FIELD FieldData {}", arrays.len())?;
    for a in arrays {
        writeln!(w, "{} {} {} {}", a.name, a.components, a.tuples(), a.ty.name())?;
        write_values(w, &a.values, a.ty, a.components, binary)?;
    }
    Ok(())
}

/// 写出一段值. ASCII 下每行 `per_line` 个值.
fn write_values<W: Write>(
    w: &mut W,
    values: &[f64],
    ty: ScalarType,
    per_line: usize,
    binary: bool,
) -> Result<()> {
    if binary {
        let mut buf = Vec::with_capacity(values.len() * ty.size());
        for &v in values {
            encode_be(&mut buf, v, ty);
        }
        w.write_all(&buf)?;
        writeln!(w)?;
        return Ok(());
    }
    for line in values.chunks(per_line.max(1)) {
        let mut first = true;
        for &v in line {
            if !first {
                write!(w, " ")?;
            }
            first = false;
            match ty {
                ScalarType::Float => write!(w, "{}", v as f32)?,
                ScalarType::Double => write!(w, "{v}")?,
                _ => write!(w, "{}", v as i64)?,
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

macro_rules! impl_be_codec {
    ($($variant: ident => $t: ty),* $(,)?) => {
        fn encode_be(buf: &mut Vec<u8>, v: f64, ty: ScalarType) {
            match ty {
                $(ScalarType::$variant => buf.extend_from_slice(&(v as $t).to_be_bytes()),)*
            }
        }

        fn decode_be(bytes: &[u8], ty: ScalarType) -> f64 {
            match ty {
                $(ScalarType::$variant => {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_be_bytes(raw) as f64
                })*
            }
        }
    };
}

impl_be_codec! {
    UnsignedChar => u8,
    Char => i8,
    UnsignedShort => u16,
    Short => i16,
    UnsignedInt => u32,
    Int => i32,
    UnsignedLong => u64,
    Long => i64,
    Float => f32,
    Double => f64,
}

#[derive(Copy, Clone, Debug)]
enum Section {
    Point(usize),
    Cell(usize),
}

impl Section {
    fn len(self) -> usize {
        match self {
            Section::Point(n) | Section::Cell(n) => n,
        }
    }
}

/// 文件中两个计数的乘积, 溢出视为文件损坏.
fn product(a: usize, b: usize, what: &str) -> Result<usize> {
    a.checked_mul(b)
        .ok_or_else(|| GeometryError::Malformed(format!("{what} size {a} x {b} overflows")))
}

fn parse_type(name: &str) -> Result<ScalarType> {
    ScalarType::parse(name).ok_or_else(|| GeometryError::Unsupported(format!("scalar type `{name}`")))
}

/// 在字节流上按行/按空白切分的游标.
struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.buf.len() && self.buf[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn token_span(&mut self) -> Option<(usize, usize)> {
        self.skip_whitespace();
        let start = self.pos;
        let mut end = start;
        while end < self.buf.len() && !self.buf[end].is_ascii_whitespace() {
            end += 1;
        }
        (end > start).then_some((start, end))
    }

    fn token(&mut self) -> Option<&'a str> {
        let (start, end) = self.token_span()?;
        self.pos = end;
        std::str::from_utf8(&self.buf[start..end]).ok()
    }

    /// 当前位置 (不跳过空白) 是否以 `keyword` 开头. 二进制数据之前只能用它探测.
    fn at_keyword(&self, keyword: &str) -> bool {
        self.buf[self.pos..]
            .get(..keyword.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(keyword.as_bytes()))
    }

    fn peek_token(&mut self) -> Option<&'a str> {
        let (start, end) = self.token_span()?;
        self.pos = start;
        std::str::from_utf8(&self.buf[start..end]).ok()
    }

    /// 读取当前位置到行尾 (不含换行) 的内容, 并移动到下一行行首.
    fn line(&mut self) -> Option<&'a str> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let start = self.pos;
        let end = self.buf[start..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(self.buf.len(), |i| start + i);
        self.pos = (end + 1).min(self.buf.len());
        std::str::from_utf8(&self.buf[start..end])
            .ok()
            .map(|l| l.trim_end_matches('\r'))
    }

    fn skip_line(&mut self) {
        self.line();
    }

    /// 跳过数组后可能出现的 `METADATA` 块.
    fn skip_metadata(&mut self) {
        if self.peek_token().is_some_and(|t| t.eq_ignore_ascii_case("METADATA")) {
            self.line();
            self.skip_metadata_body();
        }
    }

    /// `METADATA` 块以空行结束.
    fn skip_metadata_body(&mut self) {
        while let Some(l) = self.line() {
            if l.trim().is_empty() {
                break;
            }
        }
    }

    fn expect(&mut self, keyword: &'static str) -> Result<()> {
        match self.token() {
            Some(t) if t.eq_ignore_ascii_case(keyword) => Ok(()),
            Some(t) => Err(GeometryError::Malformed(format!("expected `{keyword}`, got `{t}`"))),
            None => Err(GeometryError::UnexpectedEof(keyword)),
        }
    }

    fn number(&mut self, what: &'static str) -> Result<usize> {
        let t = self.token().ok_or(GeometryError::UnexpectedEof(what))?;
        t.parse()
            .map_err(|_| GeometryError::Malformed(format!("bad {what} `{t}`")))
    }

    fn scalar_type(&mut self) -> Result<ScalarType> {
        let t = self.token().ok_or(GeometryError::UnexpectedEof("scalar type"))?;
        parse_type(t)
    }

    /// 读取 `n` 个值. 二进制数据紧接在头部行之后开始.
    fn values(&mut self, n: usize, ty: ScalarType, binary: bool) -> Result<Vec<f64>> {
        if binary {
            let size = ty.size();
            let end = product(n, size, "binary block")?
                .checked_add(self.pos)
                .ok_or_else(|| GeometryError::Malformed(format!("binary block of {n} values overflows")))?;
            if end > self.buf.len() {
                return Err(GeometryError::UnexpectedEof("binary values"));
            }
            let values = self.buf[self.pos..end]
                .chunks_exact(size)
                .map(|c| decode_be(c, ty))
                .collect();
            self.pos = end;
            return Ok(values);
        }
        (0..n)
            .map(|_| {
                let t = self.token().ok_or(GeometryError::UnexpectedEof("ascii values"))?;
                t.parse::<f64>()
                    .map_err(|_| GeometryError::Malformed(format!("bad value `{t}`")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParticleSet {
        let mut p = ParticleSet::from_points(vec![[-1.5, 2.0, 3.25], [10.0, -20.0, 0.5]]);
        p.set_point_array(DataArray::new("scale", 1, ScalarType::Float, vec![1.5, 2.5]))
            .unwrap();
        p.set_point_array(DataArray::new(
            "hevec2",
            3,
            ScalarType::Float,
            vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0],
        ))
        .unwrap();
        p.set_point_array(DataArray::new("ChestRegion", 1, ScalarType::UnsignedShort, vec![3.0, 2.0]))
            .unwrap();
        p.push_field_array(DataArray::new("irad", 1, ScalarType::Double, vec![1.7]));
        p
    }

    #[test]
    fn test_ascii_and_binary_round_trip() {
        let p = sample();
        for encoding in [VtkEncoding::Ascii, VtkEncoding::Binary] {
            let mut buf = Vec::new();
            encode_vtk(&p, &mut buf, encoding).unwrap();
            let q = parse_vtk(&buf).unwrap();
            assert_eq!(p, q, "{encoding:?}");
        }
    }

    #[test]
    fn test_parse_scalars_and_vectors() {
        let text = "# vtk DataFile Version 3.0\n\
                    particles\n\
                    ASCII\n\
                    DATASET POLYDATA\n\
                    POINTS 2 double\n\
                    0 0 0 1 1 1\n\
                    VERTICES 2 4\n\
                    1 0\n1 1\n\
                    POINT_DATA 2\n\
                    SCALARS val float\n\
                    LOOKUP_TABLE default\n\
                    -900 -850\n\
                    VECTORS dir float\n\
                    1 0 0 0 1 0\n\
                    METADATA\n\
                    INFORMATION 0\n\
                    \n";
        let p = parse_vtk(text.as_bytes()).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.point_array("val").unwrap().values, [-900.0, -850.0]);
        assert_eq!(p.point_array("dir").unwrap().tuple(1), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_binary_is_big_endian() {
        let p = ParticleSet::from_points(vec![[1.0, 0.0, 0.0]]);
        let mut buf = Vec::new();
        encode_vtk(&p, &mut buf, VtkEncoding::Binary).unwrap();
        let header = b"POINTS 1 float\n";
        let at = buf
            .windows(header.len())
            .position(|w| w == header)
            .unwrap()
            + header.len();
        assert_eq!(&buf[at..at + 4], &1.0f32.to_be_bytes());
    }

    #[test]
    fn test_rejects_other_datasets() {
        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET STRUCTURED_POINTS\n";
        assert!(matches!(
            parse_vtk(text.as_bytes()),
            Err(GeometryError::Unsupported(_))
        ));
        assert!(matches!(
            parse_vtk(b"not a vtk file\n"),
            Err(GeometryError::Malformed(_))
        ));
    }

    #[test]
    fn test_double_points_keep_precision() {
        let p = ParticleSet::from_points(vec![[0.1, -123.456789012345, 1e-9]]).with_point_type(ScalarType::Double);
        for encoding in [VtkEncoding::Ascii, VtkEncoding::Binary] {
            let mut buf = Vec::new();
            encode_vtk(&p, &mut buf, encoding).unwrap();
            let q = parse_vtk(&buf).unwrap();
            assert_eq!(q.point_type(), ScalarType::Double);
            assert_eq!(q.points(), p.points(), "{encoding:?}");
        }
    }

    #[test]
    fn test_zero_component_scalars_rejected() {
        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\n\
                    POINTS 1 float\n0 0 0\n\
                    POINT_DATA 1\nSCALARS s float 0\n";
        assert!(matches!(
            parse_vtk(text.as_bytes()),
            Err(GeometryError::Malformed(_))
        ));
    }

    #[test]
    fn test_huge_counts_rejected() {
        let huge = usize::MAX / 2;
        let ascii = format!("# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\nPOINTS {huge} float\n");
        assert!(matches!(
            parse_vtk(ascii.as_bytes()),
            Err(GeometryError::Malformed(_))
        ));

        let binary = format!("# vtk DataFile Version 3.0\nx\nBINARY\nDATASET POLYDATA\nPOINTS {} float\n", usize::MAX / 6);
        assert!(matches!(
            parse_vtk(binary.as_bytes()),
            Err(GeometryError::Malformed(_))
        ));

        let field = format!(
            "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\nFIELD FieldData 1\na {huge} 3 float\n"
        );
        assert!(matches!(
            parse_vtk(field.as_bytes()),
            Err(GeometryError::Malformed(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let p = sample();
        let path = std::env::temp_dir().join(format!("chest-berry-vtk-{}.vtk", std::process::id()));
        write_vtk(&p, &path, VtkEncoding::Binary).unwrap();
        let q = read_vtk(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(p, q);
    }
}
