use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::Serialize;

/// Approximates how many tokens a text costs for a model.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tuned for `model_name`. Estimators without per-model tuning
    /// fall back to [`TokenEstimator::estimate`].
    fn estimate_for_model(&self, text: &str, _model_name: Option<&str>) -> usize {
        self.estimate(text)
    }
}

/// Characters per token for known model families. Matched against the model
/// name by longest contained key.
const MODEL_RATIOS: &[(&str, f64)] = &[
    ("llama", 3.8),
    ("llama2", 3.8),
    ("llama3", 3.7),
    ("llama3.2", 3.7),
    ("mistral", 4.0),
    ("mixtral", 4.0),
    ("phi", 4.2),
    ("gemma", 3.9),
    ("qwen", 3.5),
    ("deepseek", 3.6),
];

const DEFAULT_RATIO: f64 = 4.0;

static CODE_INDICATORS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"```",
        r"def\s+\w+\(",
        r"class\s+\w+",
        r"function\s+\w+",
        r"import\s+\w+",
        r"from\s+\w+\s+import",
        r"<\w+[^>]*>",
        r#"\{\s*["\w]+\s*:"#,
        r"\w+\(\)",
        r"console\.log",
        r"print\(",
    ])
    .expect("code indicator patterns are valid")
});

const TECHNICAL_WORDS: &[&str] = &["api", "json", "xml", "sql", "database", "server"];
const MATH_WORDS: &[&str] = &["calculate", "equation", "solve", "formula"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Code,
    Technical,
    Mathematical,
    NaturalLanguage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Chinese,
    Japanese,
    Korean,
    Arabic,
    Cyrillic,
    Latin,
}

impl Script {
    fn adjustment(self) -> f64 {
        match self {
            Script::Chinese => 0.7,
            Script::Japanese | Script::Korean => 0.8,
            Script::Arabic | Script::Cyrillic => 0.9,
            Script::Latin => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenEstimate {
    pub estimated_tokens: usize,
    pub confidence_level: f64,
    pub content_type: ContentType,
    pub script: Script,
    pub character_count: usize,
    pub word_count: usize,
}

/// Character-ratio estimator tuned per model family, script and content type.
#[derive(Debug, Clone, Default)]
pub struct HeuristicTokenEstimator {
    model_name: Option<String>,
}

impl HeuristicTokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_model(model_name: impl Into<String>) -> Self {
        Self {
            model_name: Some(model_name.into()),
        }
    }

    pub fn estimate_detailed(&self, text: &str, model_name: Option<&str>) -> TokenEstimate {
        let character_count = text.chars().count();
        let word_count = text.split_whitespace().count();
        let content_type = detect_content_type(text);
        let script = detect_script(text);

        if text.is_empty() {
            return TokenEstimate {
                estimated_tokens: 0,
                confidence_level: 1.0,
                content_type,
                script,
                character_count,
                word_count,
            };
        }

        let ratio = model_ratio(model_name) * script.adjustment();
        let base = (character_count as f64 / ratio).max(1.0);
        let adjusted = match content_type {
            ContentType::Code => base * 1.15,
            ContentType::Technical => base * 1.05,
            ContentType::Mathematical => base * 0.95,
            ContentType::NaturalLanguage => base,
        };

        TokenEstimate {
            estimated_tokens: (adjusted.round() as usize).max(1),
            confidence_level: confidence(character_count, content_type, model_name),
            content_type,
            script,
            character_count,
            word_count,
        }
    }
}

impl TokenEstimator for HeuristicTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.estimate_detailed(text, self.model_name.as_deref())
            .estimated_tokens
    }

    fn estimate_for_model(&self, text: &str, model_name: Option<&str>) -> usize {
        self.estimate_detailed(text, model_name.or(self.model_name.as_deref()))
            .estimated_tokens
    }
}

fn model_ratio(model_name: Option<&str>) -> f64 {
    let Some(name) = model_name else {
        return DEFAULT_RATIO;
    };
    let lower = name.to_lowercase();

    MODEL_RATIOS
        .iter()
        .filter(|(key, _)| lower.contains(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, ratio)| *ratio)
        .unwrap_or(DEFAULT_RATIO)
}

fn detect_content_type(text: &str) -> ContentType {
    if CODE_INDICATORS.is_match(text) {
        return ContentType::Code;
    }

    let lower = text.to_lowercase();
    if TECHNICAL_WORDS.iter().any(|w| lower.contains(w)) {
        return ContentType::Technical;
    }

    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    let has_math_words = MATH_WORDS.iter().any(|w| lower.contains(w));
    let has_operators = text.chars().any(|c| matches!(c, '+' | '-' | '*' | '/' | '='));
    if (has_math_words && digits >= 2) || (has_operators && digits >= 3) {
        return ContentType::Mathematical;
    }

    ContentType::NaturalLanguage
}

fn detect_script(text: &str) -> Script {
    let any_in = |lo: char, hi: char| text.chars().any(|c| (lo..=hi).contains(&c));

    if any_in('\u{4e00}', '\u{9fff}') {
        Script::Chinese
    } else if any_in('\u{3040}', '\u{30ff}') {
        Script::Japanese
    } else if any_in('\u{ac00}', '\u{d7af}') {
        Script::Korean
    } else if any_in('\u{0600}', '\u{06ff}') {
        Script::Arabic
    } else if any_in('\u{0400}', '\u{04ff}') {
        Script::Cyrillic
    } else {
        Script::Latin
    }
}

fn confidence(chars: usize, content_type: ContentType, model_name: Option<&str>) -> f64 {
    let mut confidence = 0.7;
    if chars > 100 {
        confidence += 0.1;
    }
    if chars > 500 {
        confidence += 0.1;
    }
    if chars < 20 {
        confidence -= 0.2;
    }
    if let Some(name) = model_name {
        let lower = name.to_lowercase();
        if MODEL_RATIOS.iter().any(|(key, _)| lower.contains(key)) {
            confidence += 0.1;
        }
    }
    match content_type {
        ContentType::NaturalLanguage => confidence += 0.1,
        ContentType::Code => confidence -= 0.05,
        _ => {}
    }
    f64::clamp(confidence, 0.1, 1.0)
}
