use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Prefix carried by synthetic messages produced by the summary strategy.
pub const SUMMARY_MARKER: &str = "[CONVERSATION SUMMARY]";

/// Prefix carried by synthetic messages when summary generation failed and the
/// strategy was configured to degrade instead of erroring.
pub const SUMMARY_FAILURE_MARKER: &str = "[SUMMARY FAILED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Capitalised label used in transcripts sent to the generator.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// ISO-8601 timestamp, when the caller knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_summary: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
            is_summary: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Synthetic assistant message standing in for a summarised span.
    pub fn summary(summary: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: format!("{}\n{}", SUMMARY_MARKER, summary),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            is_summary: true,
        }
    }

    pub fn failed_summary(reason: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: format!("{} {}", SUMMARY_FAILURE_MARKER, reason),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            is_summary: true,
        }
    }

    pub fn is_degraded_summary(&self) -> bool {
        self.is_summary && self.content.starts_with(SUMMARY_FAILURE_MARKER)
    }

    /// Summary text without the marker line, if this is a successful summary.
    pub fn summary_text(&self) -> Option<&str> {
        if !self.is_summary {
            return None;
        }
        self.content
            .strip_prefix(SUMMARY_MARKER)
            .map(|rest| rest.trim_start_matches('\n'))
    }
}
