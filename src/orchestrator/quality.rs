use serde::{Deserialize, Serialize};

/// What survived a compression pass, as counted by the strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservedInfo {
    pub questions_preserved: usize,
    pub code_preserved: usize,
    pub recent_preserved: usize,
    pub critical_loss: usize,
}

impl PreservedInfo {
    pub fn merge(self, other: PreservedInfo) -> PreservedInfo {
        PreservedInfo {
            questions_preserved: self.questions_preserved + other.questions_preserved,
            code_preserved: self.code_preserved + other.code_preserved,
            recent_preserved: self.recent_preserved + other.recent_preserved,
            critical_loss: self.critical_loss + other.critical_loss,
        }
    }
}

/// Quality in `[0, 1]` from the message-count ratio and preservation indicators.
pub fn quality_score(original_len: usize, compressed_len: usize, info: &PreservedInfo) -> f32 {
    if original_len == 0 || compressed_len == 0 {
        return 0.0;
    }

    let mut score: f32 = 0.5;
    let ratio = compressed_len as f32 / original_len as f32;

    if ratio < 0.1 {
        score -= 0.3;
    } else if ratio < 0.3 {
        score -= 0.1;
    } else if ratio > 0.8 {
        score -= 0.2;
    } else {
        score += 0.2;
    }

    if info.questions_preserved > 0 {
        score += 0.1;
    }
    if info.code_preserved > 0 {
        score += 0.1;
    }
    if info.recent_preserved > 0 {
        score += 0.1;
    }
    if info.critical_loss > 0 {
        score -= 0.2;
    }

    score.clamp(0.0, 1.0)
}

/// `compressed / original`, defined as 1.0 for an empty original.
pub fn compression_ratio(original_tokens: usize, compressed_tokens: usize) -> f64 {
    if original_tokens == 0 {
        return 1.0;
    }
    compressed_tokens as f64 / original_tokens.max(1) as f64
}
