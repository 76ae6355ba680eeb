use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::patterns::PatternTable;
use crate::config::CompressionConfig;
use crate::models::Message;
use crate::services::token_estimator::TokenEstimator;

/// Fixed per-message framing cost added on top of role overhead.
pub const MESSAGE_STRUCTURE_OVERHEAD: usize = 5;

const ROLE_OVERHEAD: &[(&str, usize)] = &[
    ("system", 8),
    ("user", 4),
    ("assistant", 6),
    ("function", 10),
    ("tool", 10),
];

const DEFAULT_ROLE_OVERHEAD: usize = 5;

/// Messages older than this many positions from the end get no recency bonus.
const RECENCY_HORIZON: f32 = 20.0;

pub fn role_overhead(role: &str) -> usize {
    ROLE_OVERHEAD
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, tokens)| *tokens)
        .unwrap_or(DEFAULT_ROLE_OVERHEAD)
}

/// Trigger thresholds the analyzer evaluates conversations against.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub token_threshold: usize,
    pub message_threshold: usize,
    pub utilization_threshold: f64,
    pub preserve_recent: usize,
}

impl From<&CompressionConfig> for AnalyzerSettings {
    fn from(cfg: &CompressionConfig) -> Self {
        Self {
            token_threshold: cfg.trigger_token_threshold,
            message_threshold: cfg.trigger_message_count,
            utilization_threshold: cfg.trigger_utilization_percent,
            preserve_recent: cfg.preserve_recent_messages,
        }
    }
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self::from(&CompressionConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMetrics {
    pub total_messages: usize,
    pub total_tokens: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub average_message_length: f64,
    pub context_utilization: f64,
    pub conversation_age_minutes: f64,
    pub compression_candidate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextWindow {
    pub current_tokens: usize,
    pub max_tokens: usize,
    pub remaining_tokens: usize,
    pub utilization_percent: f64,
    pub is_near_limit: bool,
    pub requires_compression: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateReason {
    ShortMessage,
    LowImportance,
    NonTechnical,
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionCandidate {
    pub index: usize,
    pub importance: f32,
    pub reason: CandidateReason,
    pub content_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionSavings {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub tokens_saved: i64,
    pub compression_ratio: f64,
    pub savings_percent: f64,
}

/// Scores messages and conversations for compression decisions.
#[derive(Clone)]
pub struct ImportanceAnalyzer {
    estimator: Arc<dyn TokenEstimator>,
    patterns: Arc<PatternTable>,
    settings: AnalyzerSettings,
    model_name: Option<String>,
}

impl ImportanceAnalyzer {
    pub fn new(estimator: Arc<dyn TokenEstimator>, settings: AnalyzerSettings) -> Self {
        Self::with_patterns(estimator, settings, PatternTable::builtin())
    }

    pub fn with_patterns(
        estimator: Arc<dyn TokenEstimator>,
        settings: AnalyzerSettings,
        patterns: Arc<PatternTable>,
    ) -> Self {
        Self {
            estimator,
            patterns,
            settings,
            model_name: None,
        }
    }

    /// The same analyzer with token estimates tuned for `model_name`.
    pub fn for_model(&self, model_name: Option<&str>) -> Self {
        Self {
            model_name: model_name.map(str::to_string),
            ..self.clone()
        }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate_for_model(text, self.model_name.as_deref())
    }

    /// Content tokens only, without framing overhead.
    pub fn content_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_tokens(&m.content)).sum()
    }

    /// Content tokens plus framing and role overhead.
    pub fn message_tokens(&self, message: &Message) -> usize {
        self.estimate_tokens(&message.content)
            + MESSAGE_STRUCTURE_OVERHEAD
            + role_overhead(message.role.as_str())
    }

    pub fn is_question(&self, text: &str) -> bool {
        self.patterns.is_question(text)
    }

    pub fn contains_code(&self, text: &str) -> bool {
        self.patterns.contains_code(text)
    }

    pub fn analyze_conversation(
        &self,
        messages: &[Message],
        max_context_tokens: usize,
    ) -> ConversationMetrics {
        if messages.is_empty() {
            return ConversationMetrics {
                total_messages: 0,
                total_tokens: 0,
                user_messages: 0,
                assistant_messages: 0,
                system_messages: 0,
                average_message_length: 0.0,
                context_utilization: 0.0,
                conversation_age_minutes: 0.0,
                compression_candidate: false,
            };
        }

        let mut user_messages = 0;
        let mut assistant_messages = 0;
        let mut system_messages = 0;
        let mut total_chars = 0usize;
        let mut total_tokens = 0usize;

        for message in messages {
            match message.role {
                crate::models::Role::User => user_messages += 1,
                crate::models::Role::Assistant => assistant_messages += 1,
                crate::models::Role::System => system_messages += 1,
            }
            total_chars += message.content.chars().count();
            total_tokens += self.message_tokens(message);
        }

        let total_messages = messages.len();
        let context_utilization = utilization_percent(total_tokens, max_context_tokens);

        let compression_candidate = total_messages >= self.settings.message_threshold
            || total_tokens >= self.settings.token_threshold
            || context_utilization > self.settings.utilization_threshold;

        ConversationMetrics {
            total_messages,
            total_tokens,
            user_messages,
            assistant_messages,
            system_messages,
            average_message_length: total_chars as f64 / total_messages as f64,
            context_utilization,
            conversation_age_minutes: conversation_age_minutes(messages),
            compression_candidate,
        }
    }

    pub fn analyze_context_window(&self, messages: &[Message], max_tokens: usize) -> ContextWindow {
        let current_tokens: usize = messages.iter().map(|m| self.message_tokens(m)).sum();
        let utilization = utilization_percent(current_tokens, max_tokens);

        ContextWindow {
            current_tokens,
            max_tokens,
            remaining_tokens: max_tokens.saturating_sub(current_tokens),
            utilization_percent: utilization,
            is_near_limit: utilization > 80.0,
            requires_compression: utilization > 90.0,
        }
    }

    /// Heuristic importance in `[0, 1]`; `position_from_end` is 0 for the newest message.
    pub fn message_importance(&self, message: &Message, position_from_end: usize) -> f32 {
        let content = message.content.as_str();
        let is_user = message.role == crate::models::Role::User;

        let mut score: f32 = if message.role == crate::models::Role::Assistant {
            0.3
        } else {
            0.5
        };

        let recency = (1.0 - position_from_end as f32 / RECENCY_HORIZON).max(0.0);
        score += recency * 0.2;

        if is_user {
            score += 0.2;
            if self.patterns.is_question(content) {
                score += 0.1;
            }
        }

        if self.patterns.contains_code(content) {
            score += 0.2;
        }

        if content.chars().count() > 500 {
            score += 0.1;
        }

        if self.patterns.has_important_keyword(content) {
            score += 0.15;
        }

        if self.patterns.is_generic(content) {
            score -= 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    /// Older messages (outside the preserve window) that are cheap to drop.
    pub fn identify_compression_candidates(&self, messages: &[Message]) -> Vec<CompressionCandidate> {
        let preserve = self.settings.preserve_recent.min(messages.len());
        let older = &messages[..messages.len() - preserve];

        older
            .iter()
            .enumerate()
            .filter_map(|(index, message)| {
                let position_from_end = messages.len() - 1 - index;
                let importance = self.message_importance(message, position_from_end);
                if importance >= 0.4 {
                    return None;
                }

                let content = message.content.as_str();
                let reason = if content.chars().count() < 50 {
                    CandidateReason::ShortMessage
                } else if importance < 0.2 {
                    CandidateReason::LowImportance
                } else if !self.patterns.contains_code(content) && !self.patterns.is_question(content) {
                    CandidateReason::NonTechnical
                } else {
                    CandidateReason::General
                };

                Some(CompressionCandidate {
                    index,
                    importance,
                    reason,
                    content_preview: preview(content, 100),
                })
            })
            .collect()
    }

    pub fn compression_savings(&self, original: &[Message], compressed: &[Message]) -> CompressionSavings {
        let original_tokens: usize = original.iter().map(|m| self.message_tokens(m)).sum();
        let compressed_tokens: usize = compressed.iter().map(|m| self.message_tokens(m)).sum();
        let tokens_saved = original_tokens as i64 - compressed_tokens as i64;

        let (compression_ratio, savings_percent) = if original_tokens == 0 {
            (1.0, 0.0)
        } else {
            (
                compressed_tokens as f64 / original_tokens as f64,
                tokens_saved as f64 / original_tokens as f64 * 100.0,
            )
        };

        CompressionSavings {
            original_tokens,
            compressed_tokens,
            tokens_saved,
            compression_ratio,
            savings_percent,
        }
    }
}

fn utilization_percent(tokens: usize, max_tokens: usize) -> f64 {
    if max_tokens == 0 {
        return 0.0;
    }
    tokens as f64 / max_tokens as f64 * 100.0
}

pub(crate) fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Minutes between the first and last message; 0 unless both timestamps parse.
fn conversation_age_minutes(messages: &[Message]) -> f64 {
    let first = messages.first().and_then(|m| m.timestamp.as_deref()).and_then(parse_timestamp);
    let last = messages.last().and_then(|m| m.timestamp.as_deref()).and_then(parse_timestamp);

    match (first, last) {
        (Some(first), Some(last)) => ((last - first).num_seconds() as f64 / 60.0).max(0.0),
        _ => 0.0,
    }
}
