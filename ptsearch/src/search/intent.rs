//! Query intent classification
//!
//! Decides whether a query is looking for code or for an explanation, from
//! lexical signals in the query text alone. Pure and deterministic.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// What the caller is most likely looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Code samples, API usage, signatures
    Code,
    /// Explanations, concepts, prose
    Concept,
}

impl Intent {
    /// Lowercase name used on the wire and in config keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Code => "code",
            Intent::Concept => "concept",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-code syntax fragments. Each distinct hit weighs 2.
static CODE_SYNTAX: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bdef\s+\w",
        r"\bclass\s+\w",
        r"\bimport\s+\w",
        r"\bfrom\s+\w+\s+import\b",
        r"\btorch\.",
        r"\bnn\.",
        r"->|=>|::",
        r"[=!+\-*/]=",
        r"\w\(.*\)",
        r"@\w+",
        r"`[^`]+`",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Identifier shapes that look like API names. Each distinct hit weighs 1.
static API_NAMES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // CamelCase with at least two humps: DataLoader, BatchNorm2d
        r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+\b",
        // snake_case: zero_grad, state_dict
        r"\b[a-z][a-z0-9]*_[a-z0-9_]+\b",
        // dotted attribute access: F.relu, optim.SGD
        r"\b[A-Za-z_]\w*\.[A-Za-z_]\w*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Words that ask for code. Any hit weighs 1.
static CODE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(code|examples?|implement\w*|functions?|class(es)?|methods?|snippets?|syntax|parameters?|arguments?|returns?|imports?|modules?|apis?|calls?|invoke|instantiate|create|initiali[sz]e)\b",
    )
    .expect("static pattern")
});

/// Leading interrogatives and explanation requests. Weighs 1.
static QUESTION_LEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(how|what|why|when|where|which|who|is|are|does|do|can|should|explain|describe)\b",
    )
    .expect("static pattern")
});

/// Words that ask for understanding rather than code. Any hit weighs 1.
static CONCEPT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(concepts?|overview|difference|differences|explain\w*|understand\w*|tutorial|guide|vs|versus|between|meaning|purpose|why)\b",
    )
    .expect("static pattern")
});

/// Signal tally for a query, exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentSignals {
    /// Weighted code evidence
    pub code: u32,
    /// Weighted concept evidence
    pub concept: u32,
}

/// Count lexical signals in a query
pub fn intent_signals(query: &str) -> IntentSignals {
    let query = query.trim();
    let mut signals = IntentSignals::default();

    signals.code += 2 * CODE_SYNTAX.iter().filter(|re| re.is_match(query)).count() as u32;
    signals.code += API_NAMES.iter().filter(|re| re.is_match(query)).count() as u32;
    if CODE_WORDS.is_match(query) {
        signals.code += 1;
    }

    if QUESTION_LEAD.is_match(query) {
        signals.concept += 1;
    }
    if query.ends_with('?') {
        signals.concept += 1;
    }
    if CONCEPT_WORDS.is_match(query) {
        signals.concept += 1;
    }

    signals
}

/// Classify a query as code- or concept-seeking.
///
/// Code wins only on strictly more evidence; ties and empty queries are
/// treated as concept queries.
///
/// # Examples
/// ```
/// use ptsearch::search::{classify_intent, Intent};
///
/// assert_eq!(classify_intent("how to use DataLoader"), Intent::Concept);
/// assert_eq!(classify_intent("torch.nn.Linear example"), Intent::Code);
/// ```
pub fn classify_intent(query: &str) -> Intent {
    let signals = intent_signals(query);
    if signals.code > signals.concept {
        Intent::Code
    } else {
        Intent::Concept
    }
}
