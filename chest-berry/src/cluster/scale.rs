use ndarray::{Array2, Axis};

/// 逐列标准化为零均值, 单位方差 (总体方差).
///
/// 方差为 0 的列只做平移.
pub fn standardize(points: &Array2<f64>) -> Array2<f64> {
    let mut out = points.clone();
    if points.nrows() == 0 {
        return out;
    }
    for mut col in out.axis_iter_mut(Axis(1)) {
        let n = col.len() as f64;
        let mean = col.sum() / n;
        let std = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let scale = if std > 0.0 { std } else { 1.0 };
        col.mapv_inplace(|v| (v - mean) / scale);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardize() {
        let p = array![[1.0, 5.0], [3.0, 5.0]];
        let s = standardize(&p);
        assert_eq!(s, array![[-1.0, 0.0], [1.0, 0.0]]);
    }
}
