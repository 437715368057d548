//! Ranking engine for ptsearch
//!
//! Turns raw vector-similarity candidates into the final, intent-aware result
//! list. Candidates whose content kind matches the query intent are boosted by
//! configurable multiplicative factors, then sorted deterministically.

mod intent;

pub use intent::{classify_intent, intent_signals, Intent, IntentSignals};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Kind of content a chunk holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Source code
    Code,
    /// Prose
    Text,
}

impl ContentKind {
    /// Lowercase name used on the wire and in the store
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Code => "code",
            ContentKind::Text => "text",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "code" => Ok(ContentKind::Code),
            "text" => Ok(ContentKind::Text),
            _ => Err(Error::InvalidRecord(format!("Unknown content kind: {}", s))),
        }
    }
}

/// A retrieved chunk with its raw similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Chunk identifier in the store
    pub id: String,
    /// Chunk title, if the record has one
    pub title: Option<String>,
    /// URI or path the chunk came from
    pub source: String,
    /// Full chunk text
    pub text: String,
    /// Code or prose
    pub kind: ContentKind,
    /// Programming language for code chunks
    pub language: Option<String>,
    /// Raw similarity, higher is more relevant
    pub score: f64,
}

/// One ranked result as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItem {
    /// Display title
    pub title: String,
    /// URI or path of the source document
    pub source_locator: String,
    /// Truncated chunk text
    pub snippet: String,
    /// Code or prose
    pub content_kind: ContentKind,
    /// Programming language for code chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Boosted score, higher is more relevant
    pub score: f64,
}

/// Boost factors for one intent, keyed by content kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindBoost {
    /// Factor applied to code candidates
    pub code: f64,
    /// Factor applied to text candidates
    pub text: f64,
}

impl KindBoost {
    fn get(&self, kind: ContentKind) -> f64 {
        match kind {
            ContentKind::Code => self.code,
            ContentKind::Text => self.text,
        }
    }
}

/// Multiplicative boost table, keyed by intent then content kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostFactors {
    /// Factors used when the query is code-seeking
    pub code: KindBoost,
    /// Factors used when the query is concept-seeking
    pub concept: KindBoost,
}

impl Default for BoostFactors {
    fn default() -> Self {
        BoostFactors {
            code: KindBoost {
                code: 1.2,
                text: 1.0,
            },
            concept: KindBoost {
                code: 1.0,
                text: 1.2,
            },
        }
    }
}

impl BoostFactors {
    /// Factor applied to a candidate of `kind` under `intent`
    pub fn factor(&self, intent: Intent, kind: ContentKind) -> f64 {
        match intent {
            Intent::Code => self.code.get(kind),
            Intent::Concept => self.concept.get(kind),
        }
    }

    /// Reject factors that would break ordering (non-finite or non-positive)
    pub fn validate(&self) -> Result<()> {
        let all = [
            ("code.code", self.code.code),
            ("code.text", self.code.text),
            ("concept.code", self.concept.code),
            ("concept.text", self.concept.text),
        ];
        for (key, value) in all {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::ConfigError(format!(
                    "ranking boost {} must be a positive number, got {}",
                    key, value
                )));
            }
        }
        Ok(())
    }
}

/// How to order candidates whose boosted and raw scores are both equal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First-seen candidate wins
    #[default]
    InputOrder,
    /// Candidate matching the intent's content kind wins, then first-seen
    PreferIntentKind,
}

/// Default snippet length in characters
pub const DEFAULT_SNIPPET_LENGTH: usize = 250;

/// Intent-aware ranker
#[derive(Debug, Clone)]
pub struct Ranker {
    boosts: BoostFactors,
    tiebreak: TieBreak,
    snippet_length: usize,
}

impl Default for Ranker {
    fn default() -> Self {
        Ranker::new(BoostFactors::default())
    }
}

impl Ranker {
    /// Create a ranker with the given boost table
    pub fn new(boosts: BoostFactors) -> Self {
        Ranker {
            boosts,
            tiebreak: TieBreak::default(),
            snippet_length: DEFAULT_SNIPPET_LENGTH,
        }
    }

    /// Set the tie-break policy
    pub fn with_tiebreak(mut self, tiebreak: TieBreak) -> Self {
        self.tiebreak = tiebreak;
        self
    }

    /// Set the snippet length
    pub fn with_snippet_length(mut self, snippet_length: usize) -> Self {
        self.snippet_length = snippet_length;
        self
    }

    /// The boost table in use
    pub fn boosts(&self) -> &BoostFactors {
        &self.boosts
    }

    /// Rank candidates for a query whose intent has already been classified.
    ///
    /// Input order is treated as arbitrary; the output depends only on the
    /// candidates' scores, kinds, and relative positions. At most `limit`
    /// items are returned.
    pub fn rank(
        &self,
        query: &str,
        intent: Intent,
        candidates: Vec<Candidate>,
        limit: usize,
    ) -> Vec<ResultItem> {
        tracing::debug!(
            query,
            intent = intent.as_str(),
            candidates = candidates.len(),
            limit,
            "Ranking candidates"
        );

        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| Scored {
                position,
                boosted: candidate.score * self.boosts.factor(intent, candidate.kind),
                candidate,
            })
            .collect();

        scored.sort_by(|a, b| self.compare(intent, a, b));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|s| ResultItem {
                title: s
                    .candidate
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| format!("Result {}", s.position + 1)),
                source_locator: s.candidate.source,
                snippet: make_snippet(&s.candidate.text, self.snippet_length),
                content_kind: s.candidate.kind,
                language: s.candidate.language,
                score: s.boosted,
            })
            .collect()
    }

    /// Total order: boosted desc, raw desc, tie-break policy, input position asc
    fn compare(&self, intent: Intent, a: &Scored, b: &Scored) -> Ordering {
        order_key(b.boosted)
            .total_cmp(&order_key(a.boosted))
            .then_with(|| order_key(b.candidate.score).total_cmp(&order_key(a.candidate.score)))
            .then_with(|| match self.tiebreak {
                TieBreak::InputOrder => Ordering::Equal,
                TieBreak::PreferIntentKind => {
                    let preferred = preferred_kind(intent);
                    (b.candidate.kind == preferred).cmp(&(a.candidate.kind == preferred))
                }
            })
            .then_with(|| a.position.cmp(&b.position))
    }
}

struct Scored {
    position: usize,
    boosted: f64,
    candidate: Candidate,
}

/// Non-finite scores sort after every finite score
fn order_key(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        f64::NEG_INFINITY
    }
}

fn preferred_kind(intent: Intent) -> ContentKind {
    match intent {
        Intent::Code => ContentKind::Code,
        Intent::Concept => ContentKind::Text,
    }
}

/// Truncate text to `max_chars` characters, appending `...` when cut
pub fn make_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
