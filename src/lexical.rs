//! Lexical indexer: an in-memory inverted index with BM25 scoring.
//!
//! Postings are derived data, rebuildable from the document store. The
//! index lives behind an `RwLock`; readers hold the read guard for the
//! whole search and therefore never observe a partially applied batch.
//! A full rebuild constructs a fresh generation offline and swaps it in
//! atomically, so live queries keep running against the previous
//! generation until the swap.
//!
//! Updates tombstone superseded slots instead of rewriting postings lists;
//! physical compaction happens on rebuild.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{rank_ordering, ChunkMeta, SearchFilter};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Posting {
    slot: u32,
    tf: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot {
    meta: ChunkMeta,
    /// Token count of the chunk, for length normalization.
    len: u32,
    /// Cleared when the slot is tombstoned; dead slots are skipped during
    /// scoring and dropped on rebuild.
    alive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LexicalInner {
    postings: HashMap<String, Vec<Posting>>,
    slots: Vec<Slot>,
    slot_of: HashMap<String, u32>,
    total_len: u64,
    alive: usize,
    generation: u64,
}

/// Snapshot written to disk: the index state plus the store sequence it
/// reflects, so startup can catch up incrementally instead of rebuilding.
#[derive(Serialize, Deserialize)]
struct LexicalSnapshot {
    seq: i64,
    inner: LexicalInner,
}

pub struct LexicalIndex {
    inner: RwLock<LexicalInner>,
    k1: f64,
    b: f64,
}

impl LexicalIndex {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            inner: RwLock::new(LexicalInner::default()),
            k1,
            b,
        }
    }

    /// Number of live chunks in the index.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().alive
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().unwrap().generation
    }

    /// Index a batch of chunks. Re-indexing an existing chunk id
    /// tombstones the previous slot first, so replays converge on the
    /// same observable state.
    pub fn index_chunks(&self, items: &[(ChunkMeta, String)]) {
        let mut inner = self.inner.write().unwrap();
        for (meta, text) in items {
            add_chunk(&mut inner, meta.clone(), text);
        }
    }

    /// Tombstone chunks entirely (purge path). They disappear from every
    /// search, including include-superseded ones.
    pub fn remove_chunks(&self, chunk_ids: &[String]) {
        let mut inner = self.inner.write().unwrap();
        for id in chunk_ids {
            if let Some(&slot) = inner.slot_of.get(id) {
                kill_slot(&mut inner, slot);
            }
        }
    }

    /// Mark chunks as belonging to a superseded document version. They
    /// stay indexed for include-superseded queries but leave default
    /// retrieval.
    pub fn retire_chunks(&self, chunk_ids: &[String]) {
        let mut inner = self.inner.write().unwrap();
        for id in chunk_ids {
            if let Some(&slot) = inner.slot_of.get(id) {
                inner.slots[slot as usize].meta.superseded = true;
            }
        }
    }

    /// Attach authoritative enrichment facets to an indexed chunk.
    pub fn set_tags(&self, chunk_id: &str, tags: Vec<(String, String)>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(&slot) = inner.slot_of.get(chunk_id) {
            inner.slots[slot as usize].meta.tags = tags;
        }
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        let inner = self.inner.read().unwrap();
        inner
            .slot_of
            .get(chunk_id)
            .map(|&slot| inner.slots[slot as usize].alive)
            .unwrap_or(false)
    }

    /// Top-k chunks by BM25 score for the query, restricted to chunks
    /// matching `filter`. The filter is evaluated before a chunk can enter
    /// the candidate set (hard pre-filter), so rare facets are not starved
    /// by the cutoff.
    pub fn search(&self, query: &str, filter: &SearchFilter, k: usize) -> Vec<(ChunkMeta, f64)> {
        let terms = tokenize(query);
        if terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let inner = self.inner.read().unwrap();
        if inner.alive == 0 {
            return Vec::new();
        }

        let n = inner.alive as f64;
        let avgdl = inner.total_len as f64 / n;

        // Unique terms only: repeating a query word must not double-count.
        let mut unique: Vec<&String> = terms.iter().collect();
        unique.sort();
        unique.dedup();

        let mut scores: HashMap<u32, f64> = HashMap::new();

        for term in unique {
            let Some(postings) = inner.postings.get(term.as_str()) else {
                continue;
            };

            // Document frequency over live slots only; tombstones would
            // otherwise skew idf after many updates.
            let df = postings
                .iter()
                .filter(|p| inner.slots[p.slot as usize].alive)
                .count() as f64;
            if df == 0.0 {
                continue;
            }
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for posting in postings {
                let slot = &inner.slots[posting.slot as usize];
                if !slot.alive || !filter.matches(&slot.meta) {
                    continue;
                }
                let tf = posting.tf as f64;
                let dl = slot.len as f64;
                let norm = tf * (self.k1 + 1.0)
                    / (tf + self.k1 * (1.0 - self.b + self.b * dl / avgdl));
                *scores.entry(posting.slot).or_insert(0.0) += idf * norm;
            }
        }

        let mut ranked: Vec<(u32, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            rank_ordering(
                a.1,
                &inner.slots[a.0 as usize].meta,
                b.1,
                &inner.slots[b.0 as usize].meta,
            )
        });
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(slot, score)| (inner.slots[slot as usize].meta.clone(), score))
            .collect()
    }

    /// Replace the whole index with a freshly built generation. The build
    /// happens outside any lock; readers keep hitting the old generation
    /// until the swap.
    pub fn rebuild(&self, items: Vec<(ChunkMeta, String)>) {
        let mut fresh = LexicalInner::default();
        for (meta, text) in &items {
            add_chunk(&mut fresh, meta.clone(), text);
        }

        let mut inner = self.inner.write().unwrap();
        fresh.generation = inner.generation + 1;
        *inner = fresh;
    }

    /// Serialize the index plus its store-sequence watermark.
    pub fn save(&self, path: &std::path::Path, seq: i64) -> crate::error::Result<()> {
        let inner = self.inner.read().unwrap();
        let bytes = bincode::serialize(&LexicalSnapshot {
            seq,
            inner: inner.clone(),
        })
        .map_err(|e| crate::error::Error::Snapshot(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a snapshot, returning the watermark it reflects. `None` when
    /// no snapshot exists yet.
    pub fn load(&self, path: &std::path::Path) -> crate::error::Result<Option<i64>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let snapshot: LexicalSnapshot = bincode::deserialize(&bytes)
            .map_err(|e| crate::error::Error::Snapshot(e.to_string()))?;

        let mut inner = self.inner.write().unwrap();
        *inner = snapshot.inner;
        Ok(Some(snapshot.seq))
    }
}

fn add_chunk(inner: &mut LexicalInner, meta: ChunkMeta, text: &str) {
    if let Some(&slot) = inner.slot_of.get(&meta.chunk_id) {
        kill_slot(inner, slot);
    }

    let terms = tokenize(text);
    let len = terms.len() as u32;

    let mut freqs: HashMap<String, u32> = HashMap::new();
    for term in terms {
        *freqs.entry(term).or_insert(0) += 1;
    }

    let slot = inner.slots.len() as u32;
    inner.slot_of.insert(meta.chunk_id.clone(), slot);
    inner.slots.push(Slot {
        meta,
        len,
        alive: true,
    });

    for (term, tf) in freqs {
        inner.postings.entry(term).or_default().push(Posting { slot, tf });
    }

    inner.total_len += len as u64;
    inner.alive += 1;
}

fn kill_slot(inner: &mut LexicalInner, slot: u32) {
    let s = &mut inner.slots[slot as usize];
    if s.alive {
        s.alive = false;
        inner.total_len -= s.len as u64;
        inner.alive -= 1;
    }
}

/// Lowercase unicode word tokenizer: splits on anything that is not
/// alphanumeric, so "cykelstier, 2024" becomes ["cykelstier", "2024"].
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn meta(chunk_id: &str, committee: &str, published_at: i64) -> ChunkMeta {
        ChunkMeta {
            chunk_id: chunk_id.to_string(),
            document_id: format!("doc-{chunk_id}"),
            version: 1,
            source_type: SourceType::Minutes,
            committee: committee.to_string(),
            case_number: "SAG-2024-1".to_string(),
            published_at,
            superseded: false,
            tags: Vec::new(),
        }
    }

    fn index_with(items: &[(&str, &str, &str)]) -> LexicalIndex {
        let index = LexicalIndex::new(1.2, 0.75);
        let batch: Vec<(ChunkMeta, String)> = items
            .iter()
            .map(|(id, committee, text)| (meta(id, committee, 100), text.to_string()))
            .collect();
        index.index_chunks(&batch);
        index
    }

    #[test]
    fn test_tokenize_danish_text() {
        assert_eq!(
            tokenize("Cykelstier i Aarhus, budget 2024!"),
            vec!["cykelstier", "i", "aarhus", "budget", "2024"]
        );
        assert_eq!(tokenize("rødgrød-med-fløde"), vec!["rødgrød", "med", "fløde"]);
        assert!(tokenize("  ,,, ").is_empty());
    }

    #[test]
    fn test_term_frequency_raises_score() {
        let index = index_with(&[
            ("c1", "Byrådet", "budget behandling"),
            ("c2", "Byrådet", "budget budget budget behandling"),
            ("c3", "Byrådet", "cykelstier"),
        ]);

        let hits = index.search("budget", &SearchFilter::default(), 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.chunk_id, "c2");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let index = index_with(&[
            ("c1", "Byrådet", "budget plan"),
            ("c2", "Byrådet", "budget møde"),
            ("c3", "Byrådet", "budget cykelstier"),
        ]);

        // "cykelstier" appears once in the corpus, "budget" everywhere;
        // the chunk matching the rare term must outrank a common-term-only
        // match.
        let hits = index.search("cykelstier budget", &SearchFilter::default(), 10);
        assert_eq!(hits[0].0.chunk_id, "c3");
    }

    #[test]
    fn test_filter_is_pre_applied() {
        let index = index_with(&[
            ("c1", "Teknisk Udvalg", "budget 2024"),
            ("c2", "Byrådet", "budget 2024"),
            ("c3", "Byrådet", "budget 2024"),
        ]);

        let filter = SearchFilter {
            committees: vec!["Teknisk Udvalg".to_string()],
            ..Default::default()
        };
        // k=1 with two better-scoring chunks from other committees: a
        // post-filter would starve this result.
        let hits = index.search("budget", &filter, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.chunk_id, "c1");
    }

    #[test]
    fn test_tie_break_by_date_then_id() {
        let index = LexicalIndex::new(1.2, 0.75);
        index.index_chunks(&[
            (meta("b", "Byrådet", 100), "budget".to_string()),
            (meta("a", "Byrådet", 100), "budget".to_string()),
            (meta("z", "Byrådet", 200), "budget".to_string()),
        ]);

        let hits = index.search("budget", &SearchFilter::default(), 10);
        let ids: Vec<&str> = hits.iter().map(|(m, _)| m.chunk_id.as_str()).collect();
        // Identical scores: newest first, then id ascending.
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn test_remove_chunks_tombstones() {
        let index = index_with(&[("c1", "Byrådet", "budget"), ("c2", "Byrådet", "budget")]);
        assert_eq!(index.len(), 2);

        index.remove_chunks(&["c1".to_string()]);
        assert_eq!(index.len(), 1);
        assert!(!index.contains("c1"));

        let hits = index.search("budget", &SearchFilter::default(), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.chunk_id, "c2");
    }

    #[test]
    fn test_retired_chunks_need_include_superseded() {
        let index = index_with(&[("c1", "Byrådet", "budget")]);
        index.retire_chunks(&["c1".to_string()]);

        assert!(index.search("budget", &SearchFilter::default(), 10).is_empty());

        let include = SearchFilter {
            include_superseded: true,
            ..Default::default()
        };
        let hits = index.search("budget", &include, 10);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].0.superseded);
    }

    #[test]
    fn test_reindex_same_chunk_converges() {
        let index = index_with(&[("c1", "Byrådet", "budget")]);
        let before = index.search("budget", &SearchFilter::default(), 10);

        index.index_chunks(&[(meta("c1", "Byrådet", 100), "budget".to_string())]);
        let after = index.search("budget", &SearchFilter::default(), 10);

        assert_eq!(index.len(), 1);
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].0.chunk_id, after[0].0.chunk_id);
        assert!((before[0].1 - after[0].1).abs() < 1e-9);
    }

    #[test]
    fn test_b_zero_disables_length_normalization() {
        let long_text = "budget ".repeat(50) + "cykelstier";
        let items = vec![
            (meta("short", "Byrådet", 100), "cykelstier".to_string()),
            (meta("long", "Byrådet", 100), long_text),
        ];

        let normalized = LexicalIndex::new(1.2, 0.75);
        normalized.index_chunks(&items);
        let with_norm = normalized.search("cykelstier", &SearchFilter::default(), 10);
        // Length normalization favors the short chunk.
        assert_eq!(with_norm[0].0.chunk_id, "short");
        assert!(with_norm[0].1 > with_norm[1].1);

        let flat = LexicalIndex::new(1.2, 0.0);
        flat.index_chunks(&items);
        let without_norm = flat.search("cykelstier", &SearchFilter::default(), 10);
        // With b = 0 both chunks have tf = 1 and identical scores.
        assert!((without_norm[0].1 - without_norm[1].1).abs() < 1e-9);
    }

    #[test]
    fn test_rebuild_swaps_generation_and_compacts() {
        let index = index_with(&[("c1", "Byrådet", "budget"), ("c2", "Byrådet", "veje")]);
        index.remove_chunks(&["c2".to_string()]);
        let gen_before = index.generation();

        index.rebuild(vec![(meta("c1", "Byrådet", 100), "budget".to_string())]);
        assert_eq!(index.generation(), gen_before + 1);
        assert_eq!(index.len(), 1);

        let hits = index.search("budget", &SearchFilter::default(), 10);
        assert_eq!(hits.len(), 1);
        assert!(index.search("veje", &SearchFilter::default(), 10).is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("lexical.idx");

        let index = index_with(&[("c1", "Byrådet", "budget 2024")]);
        index.save(&path, 7).unwrap();

        let restored = LexicalIndex::new(1.2, 0.75);
        let seq = restored.load(&path).unwrap();
        assert_eq!(seq, Some(7));
        assert_eq!(restored.len(), 1);

        let hits = restored.search("budget", &SearchFilter::default(), 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.chunk_id, "c1");
    }

    #[test]
    fn test_empty_query_and_empty_index() {
        let index = LexicalIndex::new(1.2, 0.75);
        assert!(index.search("budget", &SearchFilter::default(), 10).is_empty());

        let index = index_with(&[("c1", "Byrådet", "budget")]);
        assert!(index.search("", &SearchFilter::default(), 10).is_empty());
        assert!(index.search("   ", &SearchFilter::default(), 10).is_empty());
    }
}
