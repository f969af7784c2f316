//! Embedding similarity: the numerics kept on this side of the encoder
//! boundary.
//!
//! The pretrained vision-language model lives behind the
//! [`Encoder`](crate::contract::Encoder) trait; what stays here is the
//! wrapper math: L2 normalization, cosine similarity between two embedding
//! sets, and the per-row best-match ranking used to pair product names
//! with photos.

use serde::{Deserialize, Serialize};

use crate::error::SimilarityError;

/// One embedding vector as produced by the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// L2-normalized copy. A zero vector has no direction and is returned
    /// unchanged rather than producing NaNs.
    pub fn normalized(&self) -> Embedding {
        let norm = self.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return self.clone();
        }
        Embedding(self.0.iter().map(|v| v / norm).collect())
    }

    pub fn dot(&self, other: &Embedding) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

/// Named embedding, the JSON exchange format written by the encode
/// commands and read back by matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub name: String,
    pub embedding: Embedding,
}

/// The caption handed to the text encoder for a product description.
pub fn caption(description: &str) -> String {
    format!("This is {description}")
}

/// Cosine similarity between every pair across two embedding sets.
///
/// Rows index `left`, columns index `right`. Both sets are normalized
/// here, so callers pass raw encoder output. Empty sets and mismatched
/// dimensions are errors.
pub fn similarity_matrix(
    left: &[Embedding],
    right: &[Embedding],
) -> Result<Vec<Vec<f32>>, SimilarityError> {
    if left.is_empty() || right.is_empty() {
        return Err(SimilarityError::Empty);
    }
    let dimension = left[0].dimension();
    for embedding in left.iter().chain(right.iter()) {
        if embedding.dimension() != dimension {
            return Err(SimilarityError::DimensionMismatch {
                left: dimension,
                right: embedding.dimension(),
            });
        }
    }

    let left: Vec<Embedding> = left.iter().map(Embedding::normalized).collect();
    let right: Vec<Embedding> = right.iter().map(Embedding::normalized).collect();
    Ok(left
        .iter()
        .map(|row| right.iter().map(|col| row.dot(col)).collect())
        .collect())
}

/// Best match for one row of a similarity matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub row: usize,
    pub column: usize,
    pub score: f32,
}

/// Per-row argmax over a similarity matrix.
pub fn best_matches(matrix: &[Vec<f32>]) -> Vec<BestMatch> {
    matrix
        .iter()
        .enumerate()
        .filter_map(|(row, scores)| {
            scores
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(*b))
                .map(|(column, score)| BestMatch {
                    row,
                    column,
                    score: *score,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn normalization_yields_unit_length() {
        let normalized = Embedding(vec![3.0, 4.0]).normalized();
        assert!(close(normalized.0[0], 0.6));
        assert!(close(normalized.0[1], 0.8));
        assert!(close(normalized.dot(&normalized), 1.0));
    }

    #[test]
    fn zero_vector_normalizes_to_itself() {
        let zero = Embedding(vec![0.0, 0.0, 0.0]);
        assert_eq!(zero.normalized(), zero);
    }

    #[test]
    fn known_cosine_values() {
        let left = vec![Embedding(vec![1.0, 0.0]), Embedding(vec![0.0, 2.0])];
        let right = vec![
            Embedding(vec![5.0, 0.0]),
            Embedding(vec![0.0, 0.5]),
            Embedding(vec![1.0, 1.0]),
        ];
        let matrix = similarity_matrix(&left, &right).unwrap();
        assert!(close(matrix[0][0], 1.0), "parallel vectors");
        assert!(close(matrix[0][1], 0.0), "orthogonal vectors");
        assert!(close(matrix[0][2], std::f32::consts::FRAC_1_SQRT_2));
        assert!(close(matrix[1][1], 1.0));
    }

    #[test]
    fn best_match_picks_the_highest_column_per_row() {
        let matrix = vec![vec![0.1, 0.9, 0.5], vec![0.7, 0.2, 0.3]];
        let matches = best_matches(&matrix);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].column, 1);
        assert_eq!(matches[1].column, 0);
        assert!(close(matches[0].score, 0.9));
    }

    #[test]
    fn dimension_mismatch_is_a_typed_error() {
        let left = vec![Embedding(vec![1.0, 0.0])];
        let right = vec![Embedding(vec![1.0, 0.0, 0.0])];
        assert_eq!(
            similarity_matrix(&left, &right).unwrap_err(),
            SimilarityError::DimensionMismatch { left: 2, right: 3 }
        );
    }

    #[test]
    fn empty_sets_are_rejected() {
        assert_eq!(
            similarity_matrix(&[], &[Embedding(vec![1.0])]).unwrap_err(),
            SimilarityError::Empty
        );
    }

    #[test]
    fn captions_use_the_description_template() {
        assert_eq!(caption("ocean wave"), "This is ocean wave");
    }

    #[test]
    fn records_round_trip_through_json() {
        let record = EmbeddingRecord {
            name: "ocean wave".into(),
            embedding: Embedding(vec![0.25, -1.5]),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"name":"ocean wave","embedding":[0.25,-1.5]}"#);
        let back: EmbeddingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.embedding, record.embedding);
    }
}
