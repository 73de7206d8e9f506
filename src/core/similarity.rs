/// Cosine similarity between two vectors
///
/// Returns `None` when the dimensions differ or either vector has zero norm.
/// Accumulates in f64 so repeated calls on the same input agree exactly.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// L2 norm of a vector
#[inline]
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let s = cosine_similarity(&[0.3, 0.4, 0.5], &[0.3, 0.4, 0.5]).unwrap();
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_invariant() {
        let a = cosine_similarity(&[1.0, 2.0], &[2.0, 1.0]).unwrap();
        let b = cosine_similarity(&[10.0, 20.0], &[2.0, 1.0]).unwrap();
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_or_zero() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
    }

    #[test]
    fn test_l2_norm() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-9);
    }
}
