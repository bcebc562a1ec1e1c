//! Shared math utilities.

use ndarray::{Array2, ArrayViewMut1};

use crate::error::PipelineError;

/// L2-normalize a vector in place so its magnitude is 1.
///
/// A vector whose norm is at or below `f32::EPSILON` cannot be normalized;
/// it is reported as [`PipelineError::ZeroNorm`] instead of producing NaNs.
pub fn l2_normalize_in_place(mut v: ArrayViewMut1<'_, f32>, what: &str) -> Result<(), PipelineError> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(PipelineError::ZeroNorm {
            what: what.to_string(),
        });
    }
    v.mapv_inplace(|x| x / norm);
    Ok(())
}

/// L2-normalize every row of a matrix in place.
pub fn l2_normalize_rows(m: &mut Array2<f32>, what: &str) -> Result<(), PipelineError> {
    for row in m.rows_mut() {
        l2_normalize_in_place(row, what)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_l2_normalize() {
        let mut v: Array1<f32> = array![3.0, 4.0];
        l2_normalize_in_place(v.view_mut(), "image").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_is_error() {
        let mut v: Array1<f32> = array![0.0, 0.0, 0.0];
        let err = l2_normalize_in_place(v.view_mut(), "image").unwrap_err();
        assert!(matches!(err, PipelineError::ZeroNorm { .. }));
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn test_l2_normalize_rows() {
        let mut m = array![[3.0, 4.0], [0.0, 2.0]];
        l2_normalize_rows(&mut m, "text").unwrap();
        assert!((m[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((m[[1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_rows_reports_zero_row() {
        let mut m = array![[1.0, 0.0], [0.0, 0.0]];
        assert!(l2_normalize_rows(&mut m, "text").is_err());
    }
}
