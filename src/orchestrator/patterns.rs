//! Detector tables used by the importance analyzer.
//!
//! Question detection runs on the lowercased, trimmed text. Code detection is
//! case-insensitive over the raw text.

use once_cell::sync::Lazy;
use regex::{RegexSet, RegexSetBuilder};
use std::sync::Arc;

pub const QUESTION_PATTERNS: &[&str] = &[
    r"\?$",
    r"^(what|how|why|when|where|who|which|can|could|would|should|is|are|do|does|did)\b",
    r"(help|explain|tell me|show me|guide)",
];

pub const CODE_PATTERNS: &[&str] = &[
    // fenced block
    r"```",
    // inline span
    r"`[^`]+`",
    // declarations
    r"\bdef\s+\w+\s*\(|\bclass\s+\w+|\bfunction\s+\w+|\bvar\s+\w+|\blet\s+\w+|\bconst\s+\w+",
    // SQL
    r"\bSELECT\s+.*\bFROM\b|\bINSERT\s+INTO\b|\bUPDATE\s+.*\bSET\b|\bDELETE\s+FROM\b",
    // JSON-ish object
    r#"\{\s*["\w]+\s*:\s*["\w]"#,
    // markup
    r"<\w+[^>]*>.*</\w+>|<\w+\s+[^>]*/>",
];

/// Words that mark a message as operationally relevant.
pub const IMPORTANT_KEYWORDS: &[&str] = &["error", "bug", "fix", "solution", "important", "critical"];

/// Phrases that mark a message as filler.
pub const GENERIC_PATTERNS: &[&str] = &["general response", "just a", "number"];

static BUILTIN: Lazy<Arc<PatternTable>> = Lazy::new(|| {
    Arc::new(
        PatternTable::from_tables(
            QUESTION_PATTERNS,
            CODE_PATTERNS,
            IMPORTANT_KEYWORDS,
            GENERIC_PATTERNS,
        )
        .expect("built-in detector patterns are valid"),
    )
});

#[derive(Debug, Clone)]
pub struct PatternTable {
    question: RegexSet,
    code: RegexSet,
    important_keywords: Vec<String>,
    generic_patterns: Vec<String>,
}

impl PatternTable {
    pub fn from_tables(
        question: &[&str],
        code: &[&str],
        important_keywords: &[&str],
        generic_patterns: &[&str],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            question: RegexSet::new(question)?,
            code: RegexSetBuilder::new(code).case_insensitive(true).build()?,
            important_keywords: important_keywords.iter().map(|k| k.to_lowercase()).collect(),
            generic_patterns: generic_patterns.iter().map(|p| p.to_lowercase()).collect(),
        })
    }

    pub fn builtin() -> Arc<PatternTable> {
        BUILTIN.clone()
    }

    pub fn is_question(&self, text: &str) -> bool {
        let normalized = text.trim().to_lowercase();
        self.question.is_match(&normalized)
    }

    pub fn contains_code(&self, text: &str) -> bool {
        self.code.is_match(text)
    }

    pub fn has_important_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.important_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    pub fn is_generic(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.generic_patterns.iter().any(|p| lower.contains(p.as_str()))
    }
}
