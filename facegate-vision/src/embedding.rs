use ndarray::Array1;

/// Face embedding: a fixed-length feature vector produced by an extractor.
///
/// The length is a contract between the extractor and the scorer. Nothing in
/// the matching code depends on a particular length, only on both operands
/// having the same one.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from_vec(values),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> + '_ {
        self.vector.iter()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }

    /// Euclidean norm, accumulated in f64.
    pub fn norm(&self) -> f64 {
        l2_norm(self.vector.iter().copied())
    }

    pub fn is_zero(&self) -> bool {
        self.vector.iter().all(|&x| x == 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.vector.iter().all(|x| x.is_finite())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

impl From<&[f32]> for Embedding {
    fn from(values: &[f32]) -> Self {
        Self::new(values.to_vec())
    }
}

pub(crate) fn l2_norm(values: impl Iterator<Item = f32>) -> f64 {
    values
        .map(|x| {
            let x = f64::from(x);
            x * x
        })
        .sum::<f64>()
        .sqrt()
}

/// Rescale an embedding to unit Euclidean norm.
///
/// The all-zero vector has no direction and is returned unchanged.
pub fn normalize(embedding: &Embedding) -> Embedding {
    let norm = embedding.norm();
    if norm == 0.0 {
        return embedding.clone();
    }
    Embedding {
        vector: embedding.vector.mapv(|x| (f64::from(x) / norm) as f32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_norm() {
        let e = Embedding::new(vec![3.0, 4.0]);
        let n = normalize(&e);
        assert_eq!(n.to_vec(), vec![0.6, 0.8]);
        assert!((n.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let zero = Embedding::new(vec![0.0; 16]);
        let n = normalize(&zero);
        assert_eq!(n, zero);
        assert_eq!(n.norm(), 0.0);
        assert!(n.is_zero());
    }

    #[test]
    fn test_normalize_ignores_magnitude() {
        let small = normalize(&Embedding::new(vec![1e-3, -2e-3, 5e-4]));
        let large = normalize(&Embedding::new(vec![1e3, -2e3, 5e2]));
        for (a, b) in small.iter().zip(large.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_embedding() {
        let e = Embedding::new(Vec::new());
        assert!(e.is_empty());
        assert_eq!(normalize(&e), e);
    }
}
