//! Enrichment engine: advisory, confidence-scored facet tagging.
//!
//! Enrichers derive auxiliary facets from chunk text after indexing. The
//! layer is decoupled from core indexing: results are versioned per
//! enricher, stored with a confidence score, and only promoted to
//! authoritative (usable for hard filtering) above a configured threshold.
//! A failing enricher is logged and skipped — a chunk is searchable before
//! and regardless of enrichment.
//!
//! Two built-in enrichers cover the current facets:
//! - `party-mentions` tags chunks with the political parties named in
//!   them, confidence scaled by mention share.
//! - `decision-outcome` tags minutes chunks with the outcome wording
//!   (approved, rejected, postponed, noted).

use tracing::warn;

use crate::error::Result;
use crate::lexical::tokenize;
use crate::models::Chunk;
use crate::store::{DocumentStore, EnrichmentRow};

/// A single derived facet with its confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentFacet {
    pub facet: String,
    pub value: String,
    pub confidence: f32,
}

pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;
    /// Bumped when the derivation logic changes, so stored facets can be
    /// told apart by the strategy that produced them.
    fn version(&self) -> u32;
    fn enrich(&self, text: &str) -> Result<Vec<EnrichmentFacet>>;
}

// ============ Party mentions ============

/// Danish parliamentary parties with the aliases they appear under in
/// council minutes.
const PARTIES: &[(&str, &[&str])] = &[
    ("Socialdemokratiet", &["socialdemokratiet", "socialdemokraterne"]),
    ("Venstre", &["venstre"]),
    ("Det Konservative Folkeparti", &["konservative"]),
    ("Socialistisk Folkeparti", &["sf", "socialistisk"]),
    ("Enhedslisten", &["enhedslisten"]),
    ("Radikale Venstre", &["radikale"]),
    ("Dansk Folkeparti", &["folkeparti"]),
    ("Liberal Alliance", &["liberal"]),
    ("Alternativet", &["alternativet"]),
];

/// Tags chunks with the distribution of party mentions.
pub struct PartyMentionEnricher;

impl Enricher for PartyMentionEnricher {
    fn name(&self) -> &str {
        "party-mentions"
    }

    fn version(&self) -> u32 {
        1
    }

    fn enrich(&self, text: &str) -> Result<Vec<EnrichmentFacet>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut facets = Vec::new();
        let mut total_mentions = 0usize;
        let mut counts: Vec<(&str, usize)> = Vec::new();

        for (party, aliases) in PARTIES {
            let count = tokens
                .iter()
                .filter(|t| aliases.contains(&t.as_str()))
                .count();
            if count > 0 {
                counts.push((party, count));
                total_mentions += count;
            }
        }

        for (party, count) in counts {
            // Confidence grows with mention count and with how much of the
            // political vocabulary in the chunk points at this party.
            let share = count as f32 / total_mentions as f32;
            let weight = 1.0 - 1.0 / (1.0 + count as f32);
            facets.push(EnrichmentFacet {
                facet: "enrich:party".to_string(),
                value: party.to_string(),
                confidence: (0.5 + 0.5 * share) * weight.max(0.5),
            });
        }

        Ok(facets)
    }
}

// ============ Decision outcome ============

const OUTCOMES: &[(&str, &[&str])] = &[
    ("approved", &["godkendt", "vedtaget", "tiltrådt"]),
    ("rejected", &["forkastet", "afvist"]),
    ("postponed", &["udsat", "udsættes"]),
    ("noted", &["efterretning", "orientering"]),
];

/// Tags chunks with the decision wording they contain.
pub struct DecisionOutcomeEnricher;

impl Enricher for DecisionOutcomeEnricher {
    fn name(&self) -> &str {
        "decision-outcome"
    }

    fn version(&self) -> u32 {
        1
    }

    fn enrich(&self, text: &str) -> Result<Vec<EnrichmentFacet>> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut best: Option<(&str, usize)> = None;
        for (outcome, keywords) in OUTCOMES {
            let count = tokens
                .iter()
                .filter(|t| keywords.contains(&t.as_str()))
                .count();
            if count > 0 && best.map(|(_, c)| count > c).unwrap_or(true) {
                best = Some((outcome, count));
            }
        }

        Ok(best
            .map(|(outcome, count)| {
                vec![EnrichmentFacet {
                    facet: "enrich:decision".to_string(),
                    value: outcome.to_string(),
                    // One occurrence is weak evidence; repeated decision
                    // wording in the same chunk is close to definitive.
                    confidence: (0.6 + 0.15 * (count as f32 - 1.0)).min(0.95),
                }]
            })
            .unwrap_or_default())
    }
}

// ============ Engine ============

pub struct EnrichmentEngine {
    enrichers: Vec<Box<dyn Enricher>>,
    confidence_threshold: f32,
}

impl EnrichmentEngine {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            enrichers: Vec::new(),
            confidence_threshold,
        }
    }

    pub fn with_builtins(confidence_threshold: f32) -> Self {
        let mut engine = Self::new(confidence_threshold);
        engine.register(Box::new(PartyMentionEnricher));
        engine.register(Box::new(DecisionOutcomeEnricher));
        engine
    }

    pub fn register(&mut self, enricher: Box<dyn Enricher>) {
        self.enrichers.push(enricher);
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    /// Run all enrichers over one chunk, persist the results, and return
    /// the facets that cleared the authoritative threshold. Enricher
    /// failures are logged and skipped.
    pub async fn enrich_chunk(
        &self,
        store: &DocumentStore,
        chunk: &Chunk,
    ) -> Result<Vec<(String, String)>> {
        let mut authoritative = Vec::new();

        for enricher in &self.enrichers {
            let facets = match enricher.enrich(&chunk.text) {
                Ok(facets) => facets,
                Err(e) => {
                    warn!(
                        enricher = enricher.name(),
                        chunk_id = %chunk.id,
                        error = %e,
                        "enricher failed, skipping"
                    );
                    continue;
                }
            };

            for facet in facets {
                let is_authoritative = facet.confidence >= self.confidence_threshold;
                store
                    .put_enrichment(&EnrichmentRow {
                        chunk_id: chunk.id.clone(),
                        facet: facet.facet.clone(),
                        value: facet.value.clone(),
                        confidence: facet.confidence,
                        authoritative: is_authoritative,
                        enricher: enricher.name().to_string(),
                        enricher_version: enricher.version(),
                    })
                    .await?;

                if is_authoritative {
                    authoritative.push((facet.facet, facet.value));
                }
            }
        }

        Ok(authoritative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_mentions_tagged() {
        let facets = PartyMentionEnricher
            .enrich("Venstre og Enhedslisten stemte imod, mens Socialdemokratiet stemte for.")
            .unwrap();

        let values: Vec<&str> = facets.iter().map(|f| f.value.as_str()).collect();
        assert!(values.contains(&"Venstre"));
        assert!(values.contains(&"Enhedslisten"));
        assert!(values.contains(&"Socialdemokratiet"));
        for facet in &facets {
            assert_eq!(facet.facet, "enrich:party");
            assert!(facet.confidence > 0.0 && facet.confidence <= 1.0);
        }
    }

    #[test]
    fn test_no_parties_no_facets() {
        let facets = PartyMentionEnricher
            .enrich("Budgettet for cykelstier blev behandlet.")
            .unwrap();
        assert!(facets.is_empty());
    }

    #[test]
    fn test_decision_outcome_approved() {
        let facets = DecisionOutcomeEnricher
            .enrich("Indstillingen blev godkendt som indstillet.")
            .unwrap();
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].facet, "enrich:decision");
        assert_eq!(facets[0].value, "approved");
    }

    #[test]
    fn test_decision_outcome_postponed_beats_weaker_signal() {
        let facets = DecisionOutcomeEnricher
            .enrich("Sagen blev udsat. Punktet udsættes til næste møde, ikke godkendt.")
            .unwrap();
        assert_eq!(facets[0].value, "postponed");
    }

    #[test]
    fn test_repeated_wording_raises_confidence() {
        let once = DecisionOutcomeEnricher.enrich("godkendt").unwrap()[0].confidence;
        let thrice = DecisionOutcomeEnricher
            .enrich("godkendt godkendt godkendt")
            .unwrap()[0]
            .confidence;
        assert!(thrice > once);
        assert!(thrice <= 0.95);
    }
}
