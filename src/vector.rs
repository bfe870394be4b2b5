//! Vector indexer: an in-memory HNSW graph over chunk embeddings.
//!
//! Hierarchical Navigable Small World graph (Malkov & Yashunin 2018) with
//! cosine or inner-product similarity. The `ef` search parameter is the
//! explicit recall/latency knob: for a fixed graph, a larger `ef` explores
//! a superset of candidates, so measured recall never decreases as it is
//! raised.
//!
//! Facet filters are enforced during candidate admission at layer 0:
//! traversal may route through non-matching nodes to keep the graph
//! connected, but only matching chunks ever enter the result set. Removed
//! chunks are soft-deleted and likewise never admitted; compaction happens
//! on rebuild.
//!
//! Same concurrency discipline as the lexical index: readers hold the read
//! guard for the whole search, rebuilds construct a fresh generation
//! offline and swap it in atomically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{rank_ordering, ChunkMeta, SearchFilter};

/// Bidirectional links per node above layer 0.
const M: usize = 16;
/// Links at layer 0; denser per standard practice.
const M0: usize = 2 * M;
/// Upper bound on sampled levels.
const MAX_LEVEL: usize = 32;

fn ml_factor() -> f64 {
    1.0 / (M as f64).ln()
}

/// Similarity measure, a configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Similarity {
    Cosine,
    Dot,
}

impl Similarity {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(Similarity::Cosine),
            "dot" => Ok(Similarity::Dot),
            other => Err(Error::Config(format!("unknown vector metric: {other}"))),
        }
    }

    /// Distance for graph ordering: lower is closer.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Similarity::Cosine => 1.0 - crate::embedding::cosine_similarity(a, b),
            Similarity::Dot => -crate::embedding::dot_product(a, b),
        }
    }

    /// Convert a distance back into the user-facing similarity score.
    fn similarity(&self, distance: f32) -> f32 {
        match self {
            Similarity::Cosine => 1.0 - distance,
            Similarity::Dot => -distance,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct Node {
    meta: ChunkMeta,
    vector: Vec<f32>,
    level: usize,
    neighbors: Vec<Vec<u32>>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct VectorInner {
    nodes: Vec<Node>,
    entry_point: Option<u32>,
    max_level: usize,
    slot_of: HashMap<String, u32>,
    deleted: HashSet<u32>,
    generation: u64,
}

#[derive(Serialize, Deserialize)]
struct VectorSnapshot {
    seq: i64,
    inner: VectorInner,
}

#[derive(Clone, Copy)]
struct Candidate {
    slot: u32,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
// Min-heap by distance: closest candidate pops first.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

#[derive(Clone, Copy)]
struct FarCandidate {
    slot: u32,
    distance: f32,
}

impl PartialEq for FarCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}
impl Eq for FarCandidate {}
impl PartialOrd for FarCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
// Max-heap by distance: the worst admitted result pops first.
impl Ord for FarCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

pub struct VectorIndex {
    inner: RwLock<VectorInner>,
    dims: usize,
    metric: Similarity,
    ef_construction: usize,
}

impl VectorIndex {
    pub fn new(dims: usize, metric: Similarity, ef_construction: usize) -> Self {
        Self {
            inner: RwLock::new(VectorInner::default()),
            dims,
            metric,
            ef_construction,
        }
    }

    /// Number of live embeddings in the graph.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.nodes.len() - inner.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().unwrap().generation
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        let inner = self.inner.read().unwrap();
        inner
            .slot_of
            .get(chunk_id)
            .map(|slot| !inner.deleted.contains(slot))
            .unwrap_or(false)
    }

    /// Insert or update a chunk's embedding.
    pub fn insert(&self, meta: ChunkMeta, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dims {
            return Err(Error::IndexInconsistency {
                index: "vector",
                detail: format!(
                    "dimension mismatch for chunk {}: expected {}, got {}",
                    meta.chunk_id,
                    self.dims,
                    vector.len()
                ),
            });
        }

        let mut inner = self.inner.write().unwrap();
        insert_node(&mut inner, self.metric, self.ef_construction, meta, vector);
        Ok(())
    }

    /// Soft-delete chunks (purge path).
    pub fn remove_chunks(&self, chunk_ids: &[String]) {
        let mut inner = self.inner.write().unwrap();
        for id in chunk_ids {
            if let Some(&slot) = inner.slot_of.get(id) {
                inner.deleted.insert(slot);
            }
        }
    }

    /// Flag chunks of superseded document versions; they stay reachable
    /// with include-superseded filters only.
    pub fn retire_chunks(&self, chunk_ids: &[String]) {
        let mut inner = self.inner.write().unwrap();
        for id in chunk_ids {
            if let Some(&slot) = inner.slot_of.get(id) {
                inner.nodes[slot as usize].meta.superseded = true;
            }
        }
    }

    /// Attach authoritative enrichment facets to an indexed chunk.
    pub fn set_tags(&self, chunk_id: &str, tags: Vec<(String, String)>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(&slot) = inner.slot_of.get(chunk_id) {
            inner.nodes[slot as usize].meta.tags = tags;
        }
    }

    /// Top-k chunks by similarity, restricted to chunks matching `filter`.
    /// `ef` bounds the layer-0 candidate list (clamped to at least `k`).
    pub fn search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        k: usize,
        ef: usize,
    ) -> Result<Vec<(ChunkMeta, f64)>> {
        if query.len() != self.dims {
            return Err(Error::InvalidQuery(format!(
                "query vector dimension {} does not match index dimension {}",
                query.len(),
                self.dims
            )));
        }

        let inner = self.inner.read().unwrap();
        let Some(entry) = inner.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut ep = entry;
        for level in (1..=inner.max_level).rev() {
            ep = greedy_descend(&inner, self.metric, query, ep, level);
        }

        let admitted = search_layer_filtered(
            &inner,
            self.metric,
            query,
            ep,
            ef.max(k),
            0,
            |node: &Node, slot: u32| !inner.deleted.contains(&slot) && filter.matches(&node.meta),
        );

        let mut hits: Vec<(ChunkMeta, f64)> = admitted
            .into_iter()
            .map(|c| {
                let meta = inner.nodes[c.slot as usize].meta.clone();
                (meta, self.metric.similarity(c.distance) as f64)
            })
            .collect();

        hits.sort_by(|a, b| rank_ordering(a.1, &a.0, b.1, &b.0));
        hits.truncate(k);
        Ok(hits)
    }

    /// Replace the whole graph with a freshly built generation; the build
    /// runs outside any lock.
    pub fn rebuild(&self, items: Vec<(ChunkMeta, Vec<f32>)>) -> Result<()> {
        let mut fresh = VectorInner::default();
        for (meta, vector) in items {
            if vector.len() != self.dims {
                return Err(Error::IndexInconsistency {
                    index: "vector",
                    detail: format!(
                        "dimension mismatch for chunk {} during rebuild",
                        meta.chunk_id
                    ),
                });
            }
            insert_node(&mut fresh, self.metric, self.ef_construction, meta, vector);
        }

        let mut inner = self.inner.write().unwrap();
        fresh.generation = inner.generation + 1;
        *inner = fresh;
        Ok(())
    }

    pub fn save(&self, path: &std::path::Path, seq: i64) -> Result<()> {
        let inner = self.inner.read().unwrap();
        let bytes = bincode::serialize(&VectorSnapshot {
            seq,
            inner: inner.clone(),
        })
        .map_err(|e| Error::Snapshot(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(&self, path: &std::path::Path) -> Result<Option<i64>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let snapshot: VectorSnapshot =
            bincode::deserialize(&bytes).map_err(|e| Error::Snapshot(e.to_string()))?;

        let mut inner = self.inner.write().unwrap();
        *inner = snapshot.inner;
        Ok(Some(snapshot.seq))
    }
}

fn random_level() -> usize {
    let r: f64 = rand::random::<f64>().max(f64::MIN_POSITIVE);
    ((-r.ln() * ml_factor()).floor() as usize).min(MAX_LEVEL)
}

fn insert_node(
    inner: &mut VectorInner,
    metric: Similarity,
    ef_construction: usize,
    meta: ChunkMeta,
    vector: Vec<f32>,
) {
    if let Some(&slot) = inner.slot_of.get(&meta.chunk_id) {
        let node = &mut inner.nodes[slot as usize];
        node.vector = vector;
        node.meta = meta;
        inner.deleted.remove(&slot);
        return;
    }

    let level = random_level();
    let slot = inner.nodes.len() as u32;

    inner.nodes.push(Node {
        meta: meta.clone(),
        vector: vector.clone(),
        level,
        neighbors: vec![Vec::new(); level + 1],
    });
    inner.slot_of.insert(meta.chunk_id, slot);

    let Some(entry) = inner.entry_point else {
        inner.entry_point = Some(slot);
        inner.max_level = level;
        return;
    };

    let mut ep = entry;
    for lc in (level + 1..=inner.max_level).rev() {
        ep = greedy_descend(inner, metric, &vector, ep, lc);
    }

    for lc in (0..=level.min(inner.max_level)).rev() {
        let m_max = if lc == 0 { M0 } else { M };
        let nearest =
            search_layer_filtered(inner, metric, &vector, ep, ef_construction, lc, |_, _| true);

        let selected: Vec<u32> = nearest.iter().take(m_max).map(|c| c.slot).collect();
        inner.nodes[slot as usize].neighbors[lc] = selected.clone();

        for &neighbor in &selected {
            let neighbor_level = inner.nodes[neighbor as usize].level;
            if lc > neighbor_level {
                continue;
            }
            inner.nodes[neighbor as usize].neighbors[lc].push(slot);
            if inner.nodes[neighbor as usize].neighbors[lc].len() > m_max {
                let neighbor_vec = inner.nodes[neighbor as usize].vector.clone();
                let mut links: Vec<Candidate> = inner.nodes[neighbor as usize].neighbors[lc]
                    .iter()
                    .map(|&n| Candidate {
                        slot: n,
                        distance: metric.distance(&neighbor_vec, &inner.nodes[n as usize].vector),
                    })
                    .collect();
                links.sort_by(|a, b| {
                    a.distance
                        .partial_cmp(&b.distance)
                        .unwrap_or(Ordering::Equal)
                });
                inner.nodes[neighbor as usize].neighbors[lc] =
                    links.into_iter().take(m_max).map(|c| c.slot).collect();
            }
        }

        if let Some(&first) = selected.first() {
            ep = first;
        }
    }

    if level > inner.max_level {
        inner.max_level = level;
        inner.entry_point = Some(slot);
    }
}

/// Greedy single-entry descent used on layers above 0. Routes through
/// deleted nodes: they only steer the walk, they are never returned.
fn greedy_descend(
    inner: &VectorInner,
    metric: Similarity,
    query: &[f32],
    ep: u32,
    level: usize,
) -> u32 {
    let mut current = ep;
    let mut current_dist = metric.distance(query, &inner.nodes[current as usize].vector);

    loop {
        let mut changed = false;
        let node = &inner.nodes[current as usize];
        if level < node.neighbors.len() {
            for &neighbor in &node.neighbors[level] {
                let dist = metric.distance(query, &inner.nodes[neighbor as usize].vector);
                if dist < current_dist {
                    current = neighbor;
                    current_dist = dist;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    current
}

/// Best-first layer search. Exploration is unrestricted (so rare facets do
/// not disconnect the walk), but only nodes passing `admit` enter the
/// result list of width `ef`. Returns admitted candidates sorted by
/// distance ascending.
fn search_layer_filtered(
    inner: &VectorInner,
    metric: Similarity,
    query: &[f32],
    ep: u32,
    ef: usize,
    level: usize,
    admit: impl Fn(&Node, u32) -> bool,
) -> Vec<Candidate> {
    let mut visited: HashSet<u32> = HashSet::new();
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut results: BinaryHeap<FarCandidate> = BinaryHeap::new();

    let dist = metric.distance(query, &inner.nodes[ep as usize].vector);
    visited.insert(ep);
    candidates.push(Candidate { slot: ep, distance: dist });
    if admit(&inner.nodes[ep as usize], ep) {
        results.push(FarCandidate { slot: ep, distance: dist });
    }

    while let Some(Candidate { slot, distance }) = candidates.pop() {
        let worst = results.peek().map(|r| r.distance).unwrap_or(f32::MAX);
        if distance > worst && results.len() >= ef {
            break;
        }

        let node = &inner.nodes[slot as usize];
        if level >= node.neighbors.len() {
            continue;
        }
        for &neighbor in &node.neighbors[level] {
            if !visited.insert(neighbor) {
                continue;
            }
            let dist = metric.distance(query, &inner.nodes[neighbor as usize].vector);
            let worst = results.peek().map(|r| r.distance).unwrap_or(f32::MAX);

            if dist < worst || results.len() < ef {
                candidates.push(Candidate { slot: neighbor, distance: dist });
                if admit(&inner.nodes[neighbor as usize], neighbor) {
                    results.push(FarCandidate { slot: neighbor, distance: dist });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }
    }

    let mut sorted: Vec<Candidate> = results
        .into_iter()
        .map(|fc| Candidate { slot: fc.slot, distance: fc.distance })
        .collect();
    sorted.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn meta(chunk_id: &str, committee: &str) -> ChunkMeta {
        ChunkMeta {
            chunk_id: chunk_id.to_string(),
            document_id: format!("doc-{chunk_id}"),
            version: 1,
            source_type: SourceType::Minutes,
            committee: committee.to_string(),
            case_number: "SAG-2024-1".to_string(),
            published_at: 100,
            superseded: false,
            tags: Vec::new(),
        }
    }

    /// Deterministic pseudo-random unit-ish vectors for bulk tests.
    fn synthetic_vector(seed: u64, dims: usize) -> Vec<f32> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..dims)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0
            })
            .collect()
    }

    fn exhaustive_top_k(
        vectors: &[(String, Vec<f32>)],
        query: &[f32],
        k: usize,
    ) -> Vec<String> {
        let mut scored: Vec<(String, f32)> = vectors
            .iter()
            .map(|(id, v)| (id.clone(), crate::embedding::cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.into_iter().take(k).map(|(id, _)| id).collect()
    }

    #[test]
    fn test_insert_and_search_ranking() {
        let index = VectorIndex::new(3, Similarity::Cosine, 200);
        index.insert(meta("similar", "Byrådet"), vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(meta("different", "Byrådet"), vec![0.0, 1.0, 0.0]).unwrap();

        let hits = index
            .search(&[0.9, 0.1, 0.0], &SearchFilter::default(), 2, 16)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.chunk_id, "similar");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = VectorIndex::new(3, Similarity::Cosine, 200);
        let err = index.insert(meta("c1", "Byrådet"), vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::IndexInconsistency { .. }));

        index.insert(meta("c1", "Byrådet"), vec![1.0, 0.0, 0.0]).unwrap();
        let err = index
            .search(&[1.0], &SearchFilter::default(), 1, 16)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_upsert_replaces_vector() {
        let index = VectorIndex::new(2, Similarity::Cosine, 200);
        index.insert(meta("c1", "Byrådet"), vec![1.0, 0.0]).unwrap();
        index.insert(meta("c2", "Byrådet"), vec![0.0, 1.0]).unwrap();
        assert_eq!(index.len(), 2);

        // Move c1 near the second axis; it should now win for that query.
        index.insert(meta("c1", "Byrådet"), vec![0.1, 1.0]).unwrap();
        assert_eq!(index.len(), 2);

        let hits = index
            .search(&[0.0, 1.0], &SearchFilter::default(), 1, 16)
            .unwrap();
        assert_eq!(hits[0].0.chunk_id, "c1");
    }

    #[test]
    fn test_filter_admission_with_rare_facet() {
        let index = VectorIndex::new(4, Similarity::Cosine, 200);
        for i in 0..50 {
            let committee = if i == 17 { "Teknisk Udvalg" } else { "Byrådet" };
            index
                .insert(meta(&format!("c{i}"), committee), synthetic_vector(i, 4))
                .unwrap();
        }

        let filter = SearchFilter {
            committees: vec!["Teknisk Udvalg".to_string()],
            ..Default::default()
        };
        let hits = index
            .search(&synthetic_vector(999, 4), &filter, 5, 32)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.chunk_id, "c17");
    }

    #[test]
    fn test_removed_chunks_never_admitted() {
        let index = VectorIndex::new(2, Similarity::Cosine, 200);
        index.insert(meta("c1", "Byrådet"), vec![1.0, 0.0]).unwrap();
        index.insert(meta("c2", "Byrådet"), vec![0.9, 0.1]).unwrap();

        index.remove_chunks(&["c1".to_string()]);
        assert_eq!(index.len(), 1);
        assert!(!index.contains("c1"));

        let hits = index
            .search(&[1.0, 0.0], &SearchFilter::default(), 5, 16)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.chunk_id, "c2");
    }

    #[test]
    fn test_retired_chunks_need_include_superseded() {
        let index = VectorIndex::new(2, Similarity::Cosine, 200);
        index.insert(meta("c1", "Byrådet"), vec![1.0, 0.0]).unwrap();
        index.retire_chunks(&["c1".to_string()]);

        let hits = index
            .search(&[1.0, 0.0], &SearchFilter::default(), 5, 16)
            .unwrap();
        assert!(hits.is_empty());

        let include = SearchFilter {
            include_superseded: true,
            ..Default::default()
        };
        let hits = index.search(&[1.0, 0.0], &include, 5, 16).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].0.superseded);
    }

    #[test]
    fn test_recall_monotone_in_ef() {
        let dims = 8;
        let index = VectorIndex::new(dims, Similarity::Cosine, 100);
        let mut vectors = Vec::new();
        for i in 0..200u64 {
            let v = synthetic_vector(i, dims);
            vectors.push((format!("c{i:03}"), v.clone()));
            index.insert(meta(&format!("c{i:03}"), "Byrådet"), v).unwrap();
        }

        let k = 10;
        let mut last_recall = 0.0f64;
        for ef in [k, 2 * k, 8 * k, 200] {
            let mut total = 0usize;
            for q in 0..5u64 {
                let query = synthetic_vector(1000 + q, dims);
                let truth = exhaustive_top_k(&vectors, &query, k);
                let hits = index
                    .search(&query, &SearchFilter::default(), k, ef)
                    .unwrap();
                total += hits
                    .iter()
                    .filter(|(m, _)| truth.contains(&m.chunk_id))
                    .count();
            }
            let recall = total as f64 / (5 * k) as f64;
            assert!(
                recall >= last_recall - 1e-9,
                "recall dropped from {last_recall} to {recall} at ef={ef}"
            );
            last_recall = recall;
        }
        // With ef covering the whole graph, search is effectively exact.
        assert!(last_recall > 0.99, "full-ef recall was {last_recall}");
    }

    #[test]
    fn test_dot_metric_ranks_by_inner_product() {
        let index = VectorIndex::new(2, Similarity::Dot, 200);
        index.insert(meta("small", "Byrådet"), vec![1.0, 0.0]).unwrap();
        index.insert(meta("large", "Byrådet"), vec![3.0, 0.0]).unwrap();

        // Same direction, larger magnitude wins under inner product.
        let hits = index
            .search(&[1.0, 0.0], &SearchFilter::default(), 2, 16)
            .unwrap();
        assert_eq!(hits[0].0.chunk_id, "large");
        assert!((hits[0].1 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_rebuild_swaps_generation_and_compacts() {
        let index = VectorIndex::new(2, Similarity::Cosine, 200);
        index.insert(meta("c1", "Byrådet"), vec![1.0, 0.0]).unwrap();
        index.insert(meta("c2", "Byrådet"), vec![0.0, 1.0]).unwrap();
        index.remove_chunks(&["c2".to_string()]);
        let gen_before = index.generation();

        index
            .rebuild(vec![(meta("c1", "Byrådet"), vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(index.generation(), gen_before + 1);
        assert_eq!(index.len(), 1);
        assert!(!index.contains("c2"));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vector.idx");

        let index = VectorIndex::new(2, Similarity::Cosine, 200);
        index.insert(meta("c1", "Byrådet"), vec![1.0, 0.0]).unwrap();
        index.save(&path, 11).unwrap();

        let restored = VectorIndex::new(2, Similarity::Cosine, 200);
        assert_eq!(restored.load(&path).unwrap(), Some(11));
        assert_eq!(restored.len(), 1);

        let hits = restored
            .search(&[1.0, 0.0], &SearchFilter::default(), 1, 16)
            .unwrap();
        assert_eq!(hits[0].0.chunk_id, "c1");
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::new(2, Similarity::Cosine, 200);
        let hits = index
            .search(&[1.0, 0.0], &SearchFilter::default(), 5, 16)
            .unwrap();
        assert!(hits.is_empty());
    }
}
