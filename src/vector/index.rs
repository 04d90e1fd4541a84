//! In-memory vector index with cosine similarity search.

use std::collections::HashMap;

use crate::eid::Eid;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Hash of the content that was embedded
    pub content_hash: u64,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

/// In-memory vector index keyed by idea id.
pub struct VectorIndex {
    entries: HashMap<Eid, VectorEntry>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Search result from the vector index.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: Eid,
    /// Cosine similarity score (0.0 to 1.0)
    pub score: f32,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or update an entry.
    ///
    /// Returns an error on dimension mismatch or a zero-norm vector
    /// (which cannot participate in cosine similarity).
    pub fn insert(
        &mut self,
        id: Eid,
        content_hash: u64,
        embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        let norm = Self::l2_norm(&embedding);
        if norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.insert(
            id,
            VectorEntry {
                content_hash,
                embedding,
            },
        );

        Ok(())
    }

    pub fn remove(&mut self, id: &Eid) -> Option<VectorEntry> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &Eid) -> Option<&VectorEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &Eid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Eid, &VectorEntry)> {
        self.entries.iter()
    }

    /// Cosine similarity search.
    ///
    /// Returns entries scoring at least `threshold`, best first, at
    /// most `limit` of them.
    pub fn search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = Self::l2_norm(query);
        if query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| {
                let score = Self::cosine_similarity(query, &entry.embedding, query_norm);
                if score >= threshold {
                    Some(SearchResult {
                        id: id.clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        results.truncate(limit);

        Ok(results)
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Assumes query_norm is precomputed.
    fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if target_norm < f32::EPSILON {
            return 0.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        dot_product / (query_norm * target_norm)
    }

    /// Bulk load entries, used when loading from storage.
    pub fn bulk_load(&mut self, entries: Vec<(Eid, u64, Vec<f32>)>) -> Result<(), IndexError> {
        for (id, content_hash, embedding) in entries {
            self.insert(id, content_hash, embedding)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eid(n: u32) -> Eid {
        format!("idea-{n}").into()
    }

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(1536);
        assert_eq!(index.dimensions(), 1536);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = VectorIndex::new(3);
        let embedding = vec![1.0, 0.0, 0.0];

        index.insert(eid(1), 12345, embedding.clone()).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.contains(&eid(1)));

        let entry = index.get(&eid(1)).unwrap();
        assert_eq!(entry.content_hash, 12345);
        assert_eq!(entry.embedding, embedding);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let result = index.insert(eid(1), 12345, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_zero_norm_rejected() {
        let mut index = VectorIndex::new(3);
        let result = index.insert(eid(1), 12345, vec![0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let mut index = VectorIndex::new(3);

        index.insert(eid(1), 100, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(eid(2), 200, vec![0.0, 1.0, 0.0]).unwrap();

        let query = vec![1.0, 0.1, 0.0];
        let results = index.search(&query, 0.0, 10).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, eid(1));
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_search_threshold_filters() {
        let mut index = VectorIndex::new(3);

        index.insert(eid(1), 100, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(eid(2), 200, vec![0.0, 1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 0.9, 10).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, eid(1));
        assert!((results[0].score - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_search_limit() {
        let mut index = VectorIndex::new(3);

        for i in 0..10 {
            index
                .insert(eid(i), u64::from(i) * 100, vec![1.0, i as f32 * 0.1, 0.0])
                .unwrap();
        }

        let results = index.search(&[1.0, 0.0, 0.0], 0.0, 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_remove() {
        let mut index = VectorIndex::new(3);
        index.insert(eid(1), 100, vec![1.0, 0.0, 0.0]).unwrap();

        assert!(index.remove(&eid(1)).is_some());
        assert!(!index.contains(&eid(1)));
    }

    #[test]
    fn test_bulk_load() {
        let mut index = VectorIndex::new(3);

        index
            .bulk_load(vec![
                (eid(1), 100, vec![1.0, 0.0, 0.0]),
                (eid(2), 200, vec![0.0, 1.0, 0.0]),
                (eid(3), 300, vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();

        assert_eq!(index.len(), 3);
    }
}
