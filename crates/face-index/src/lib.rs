//! ANN face index (C1): an HNSW-backed cosine-similarity index over enrolled
//! face embeddings, kept in sync with the repository layer.
//!
//! Grounded on the facial-recognition plugin's linear `match_face` contract
//! (the public surface: `Search`, `Add`, `Remove`, `Rebuild`, `SetThreshold`)
//! combined with the `instant-distance`-backed `EmbeddingSimilarity`/`HnswIndex`
//! wrapper used elsewhere in this codebase's surrounding ecosystem — including
//! its documented limitation that the underlying HNSW graph cannot evict a
//! point once inserted, so removal is a shadow-map tombstone filtered at
//! search time rather than a true delete.

pub mod metrics;

use anyhow::Result;
use common::domain::{FaceStatus, Person, PersonFace, PersonStatus};
use common::repository::PersonFaceRepo;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const DEFAULT_THRESHOLD: f32 = 0.75;
const MIN_CAPACITY: usize = 100;

#[derive(Clone)]
struct Point(Vec<f32>);

impl instant_distance::Point for Point {
    fn distance(&self, other: &Self) -> f32 {
        let dot: f32 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let norm_a: f32 = self.0.iter().map(|a| a * a).sum::<f32>().sqrt();
        let norm_b: f32 = other.0.iter().map(|b| b * b).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;
        if denom == 0.0 {
            return 1.0;
        }
        1.0 - (dot / denom)
    }
}

#[derive(Debug, Clone)]
struct IndexedFace {
    person_face_id: i64,
    person_id: i64,
    person_name: String,
    embedding: Vec<f32>,
    /// tombstoned entries are kept in the dense array (HNSW position must
    /// stay stable) but filtered out at search time.
    removed: bool,
}

struct HnswIndex {
    hnsw: instant_distance::HnswMap<Point, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub person_face_id: i64,
    pub person_id: i64,
    pub person_name: String,
    pub similarity: f32,
    pub is_match: bool,
}

pub struct FaceIndex {
    index: RwLock<Option<HnswIndex>>,
    entries: RwLock<Vec<IndexedFace>>,
    dimension: RwLock<Option<usize>>,
    threshold: RwLock<f32>,
    /// Soft capacity the committed graph was built for; `Add` past this
    /// triggers one rebuild so the graph is resized for the new entry count.
    capacity: RwLock<usize>,
    repo: Arc<dyn PersonFaceRepo>,
}

impl FaceIndex {
    pub fn new(repo: Arc<dyn PersonFaceRepo>) -> Self {
        Self {
            index: RwLock::new(None),
            entries: RwLock::new(Vec::new()),
            dimension: RwLock::new(None),
            threshold: RwLock::new(DEFAULT_THRESHOLD),
            capacity: RwLock::new(MIN_CAPACITY),
            repo,
        }
    }

    pub async fn set_threshold(&self, tau: f32) {
        let clamped = tau.clamp(0.0, 1.0);
        *self.threshold.write().await = clamped;
    }

    pub async fn threshold(&self) -> f32 {
        *self.threshold.read().await
    }

    /// Load all active, embedding-bearing faces and build the index. The
    /// embedding dimension is fixed from the first valid row; rows whose
    /// embedding length disagrees are skipped rather than rejected wholesale.
    pub async fn initialize(&self) -> Result<()> {
        let rows = self.repo.list_indexable().await?;
        let mut dim: Option<usize> = None;
        let mut entries = Vec::with_capacity(rows.len());

        for (face, person) in rows {
            if person.status != PersonStatus::Active || face.status != FaceStatus::Active {
                continue;
            }
            let Some(embedding) = face.embedding_f32() else {
                continue;
            };
            let d = *dim.get_or_insert(embedding.len());
            if embedding.len() != d {
                warn!(
                    person_face_id = face.id,
                    expected = d,
                    actual = embedding.len(),
                    "skipping face with mismatched embedding dimension during initialize"
                );
                continue;
            }
            entries.push(IndexedFace {
                person_face_id: face.id,
                person_id: person.id,
                person_name: person.name.clone(),
                embedding,
                removed: false,
            });
        }

        *self.dimension.write().await = dim;
        self.commit(entries).await;
        info!(faces = self.entries.read().await.len(), "face index initialized");
        Ok(())
    }

    async fn commit(&self, entries: Vec<IndexedFace>) {
        if entries.is_empty() {
            *self.index.write().await = None;
            *self.entries.write().await = Vec::new();
            *self.capacity.write().await = MIN_CAPACITY;
            metrics::FACE_INDEX_SIZE.set(0);
            return;
        }

        let points: Vec<Point> = entries.iter().map(|e| Point(e.embedding.clone())).collect();
        let values: Vec<usize> = (0..points.len()).collect();
        let hnsw = instant_distance::Builder::default().build(points, values);

        *self.index.write().await = Some(HnswIndex { hnsw });
        let live = entries.iter().filter(|e| !e.removed).count();
        *self.capacity.write().await = (entries.len() * 2).max(MIN_CAPACITY);
        *self.entries.write().await = entries;
        metrics::FACE_INDEX_SIZE.set(live as i64);
    }

    /// Rebuild the index from the persisted repository state, dropping the
    /// in-memory shadow map.
    pub async fn rebuild(&self) -> Result<()> {
        metrics::FACE_INDEX_REBUILDS_TOTAL.inc();
        self.initialize().await
    }

    /// Add a newly-enrolled face to the index. Rebuilds once and retries if
    /// the current committed graph has reached its sized capacity.
    pub async fn add(&self, face: &PersonFace, person: &Person) -> Result<()> {
        let Some(embedding) = face.embedding_f32() else {
            return Ok(());
        };

        let dim = *self.dimension.read().await;
        if let Some(d) = dim {
            if embedding.len() != d {
                warn!(
                    person_face_id = face.id,
                    "embedding dimension mismatch on add, rebuilding to re-derive dimension"
                );
                self.rebuild().await?;
                let dim2 = *self.dimension.read().await;
                match dim2 {
                    Some(d2) if d2 == embedding.len() => {}
                    Some(_) => {
                        return Err(anyhow::anyhow!(
                            "embedding dimension mismatch for face {}: expected {d}, got {}",
                            face.id,
                            embedding.len()
                        ));
                    }
                    None => *self.dimension.write().await = Some(embedding.len()),
                }
            }
        } else {
            *self.dimension.write().await = Some(embedding.len());
        }

        let at_capacity = {
            let entries = self.entries.read().await;
            entries.len() >= *self.capacity.read().await
        };
        if at_capacity {
            self.rebuild().await?;
        }

        let mut entries = self.entries.read().await.clone();
        entries.push(IndexedFace {
            person_face_id: face.id,
            person_id: person.id,
            person_name: person.name.clone(),
            embedding,
            removed: false,
        });
        self.commit(entries).await;
        Ok(())
    }

    /// Tombstone a face. The underlying HNSW graph cannot evict a point once
    /// inserted, so this only flips the shadow-map flag; `search` filters
    /// tombstoned entries out of its results.
    pub async fn remove(&self, person_face_id: i64) {
        let mut entries = self.entries.write().await;
        let mut removed_count = 0;
        for e in entries.iter_mut() {
            if e.person_face_id == person_face_id {
                e.removed = true;
                removed_count += 1;
            }
        }
        if removed_count > 0 {
            let live = entries.iter().filter(|e| !e.removed).count();
            metrics::FACE_INDEX_SIZE.set(live as i64);
        }
    }

    /// Search for up to `k` ranked matches, best similarity first. Dimension
    /// mismatches trigger one rebuild-and-retry; on repeat mismatch or any
    /// other error the search degrades to an empty result rather than
    /// propagating to the recognition worker.
    pub async fn search(&self, query: &[f32], k: usize) -> Vec<FaceMatch> {
        if k == 0 {
            return Vec::new();
        }

        let dim = *self.dimension.read().await;
        if let Some(d) = dim {
            if query.len() != d {
                debug!("query dimension mismatch, attempting rebuild-and-retry");
                if self.rebuild().await.is_err() {
                    return Vec::new();
                }
                let dim2 = *self.dimension.read().await;
                if dim2 != Some(query.len()) {
                    return Vec::new();
                }
            }
        }

        let threshold = self.threshold().await;
        let index = self.index.read().await;
        let entries = self.entries.read().await;

        let Some(idx) = index.as_ref() else {
            return Vec::new();
        };

        let query_point = Point(query.to_vec());
        let mut search_buf = instant_distance::Search::default();
        let mut matches = Vec::with_capacity(k);
        for result in idx.hnsw.search(&query_point, &mut search_buf) {
            if matches.len() >= k {
                break;
            }
            let position = *result.value;
            let Some(entry) = entries.get(position) else { continue };
            if entry.removed {
                continue;
            }
            let similarity = (1.0 - result.distance).clamp(0.0, 1.0);
            matches.push(FaceMatch {
                person_face_id: entry.person_face_id,
                person_id: entry.person_id,
                person_name: entry.person_name.clone(),
                similarity,
                is_match: similarity >= threshold,
            });
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result as AResult;
    use async_trait::async_trait;
    use common::domain::{FaceStatus, Person, PersonFace, PersonStatus};

    struct FixedRepo(Vec<(PersonFace, Person)>);

    #[async_trait]
    impl PersonFaceRepo for FixedRepo {
        async fn list_indexable(&self) -> AResult<Vec<(PersonFace, Person)>> {
            Ok(self.0.clone())
        }
        async fn get(&self, id: i64) -> AResult<Option<PersonFace>> {
            Ok(self.0.iter().find(|(f, _)| f.id == id).map(|(f, _)| f.clone()))
        }
        async fn create(&self, face: &PersonFace) -> AResult<PersonFace> {
            Ok(face.clone())
        }
    }

    fn face(id: i64, person_id: i64, embedding: Vec<f32>) -> (PersonFace, Person) {
        (
            PersonFace {
                id,
                person_id,
                embedding: Some(PersonFace::encode_embedding(&embedding)),
                reliability: 1.0,
                status: FaceStatus::Active,
            },
            Person {
                id: person_id,
                organization_id: 1,
                name: format!("person-{person_id}"),
                document_number: None,
                status: PersonStatus::Active,
            },
        )
    }

    #[tokio::test]
    async fn search_returns_enrolled_face_with_identical_embedding() {
        let embedding = vec![1.0_f32, 0.0, 0.0, 0.0];
        let repo = Arc::new(FixedRepo(vec![face(1, 10, embedding.clone())]));
        let index = FaceIndex::new(repo);
        index.initialize().await.unwrap();

        let results = index.search(&embedding, 1).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].similarity >= 0.999);
        assert!(results[0].is_match);
        assert_eq!(results[0].person_face_id, 1);
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_empty() {
        let repo = Arc::new(FixedRepo(vec![]));
        let index = FaceIndex::new(repo);
        index.initialize().await.unwrap();
        let results = index.search(&[1.0, 0.0], 1).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn below_threshold_match_is_not_reported_as_match() {
        let enrolled = vec![1.0_f32, 0.0];
        let repo = Arc::new(FixedRepo(vec![face(1, 10, enrolled)]));
        let index = FaceIndex::new(repo);
        index.initialize().await.unwrap();
        index.set_threshold(0.99).await;

        // Orthogonal query: similarity ~0.
        let results = index.search(&[0.0, 1.0], 1).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_match);
    }

    #[tokio::test]
    async fn remove_tombstones_without_rebuild_and_is_filtered_at_search() {
        let embedding = vec![1.0_f32, 0.0, 0.0];
        let repo = Arc::new(FixedRepo(vec![face(1, 10, embedding.clone())]));
        let index = FaceIndex::new(repo);
        index.initialize().await.unwrap();

        index.remove(1).await;
        let results = index.search(&embedding, 1).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn rebuild_preserves_search_results_for_unchanged_faces() {
        let embedding = vec![0.0_f32, 1.0, 0.0];
        let repo = Arc::new(FixedRepo(vec![face(1, 10, embedding.clone())]));
        let index = FaceIndex::new(repo);
        index.initialize().await.unwrap();

        let before = index.search(&embedding, 1).await;
        index.rebuild().await.unwrap();
        let after = index.search(&embedding, 1).await;

        assert_eq!(before.len(), after.len());
        assert!((before[0].similarity - after[0].similarity).abs() < 1e-4);
    }

    #[tokio::test]
    async fn add_past_capacity_rebuilds_and_remains_searchable() {
        let repo = Arc::new(FixedRepo(vec![]));
        let index = FaceIndex::new(repo);
        index.initialize().await.unwrap();
        // MIN_CAPACITY is 100; force a tiny capacity so add() must rebuild.
        *index.capacity.write().await = 1;
        *index.dimension.write().await = Some(3);

        let (face, person) = face(7, 70, vec![0.2, 0.4, 0.6]);
        index.add(&face, &person).await.unwrap();

        let results = index.search(&face.embedding_f32().unwrap(), 1).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].person_face_id, 7);
    }

    #[tokio::test]
    async fn search_returns_up_to_k_ranked_matches() {
        let repo = Arc::new(FixedRepo(vec![
            face(1, 10, vec![1.0, 0.0, 0.0]),
            face(2, 20, vec![0.9, 0.1, 0.0]),
            face(3, 30, vec![0.0, 1.0, 0.0]),
        ]));
        let index = FaceIndex::new(repo);
        index.initialize().await.unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn set_threshold_clamps_to_unit_interval() {
        let repo = Arc::new(FixedRepo(vec![]));
        let index = FaceIndex::new(repo);
        index.set_threshold(5.0).await;
        assert_eq!(index.threshold().await, 1.0);
        index.set_threshold(-5.0).await;
        assert_eq!(index.threshold().await, 0.0);
    }
}
