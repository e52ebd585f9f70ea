// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The embedding collaborator: out of scope beyond this interface (§1).
//! Used for both grounding-spec matching and plan-cache lookups.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("embedding call failed: {0}")]
    CallFailed(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
}

/// L2-normalises `vector` in place; a zero vector is left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Strips every `{placeholder}` token from `text`, collapsing the
/// surrounding whitespace, so two actions that differ only by placeholder
/// names compare equal for grounding/cache matching (§4.6, §4.5).
pub fn strip_placeholders(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            for inner in chars.by_ref() {
                if inner == '}' {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds the text the plan cache embeds for a lookup: the action plus the
/// sorted field list extracted from `params` (§4.5 step 2).
pub fn cache_embedding_text(action: &str, param_fields: &[String]) -> String {
    let mut fields = param_fields.to_vec();
    fields.sort();
    format!("{action} {}", fields.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_untouched() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn strip_placeholders_removes_braces_and_collapses_whitespace() {
        assert_eq!(strip_placeholders("refund {orderId} for {reason}"), "refund for");
    }

    #[test]
    fn cache_embedding_text_sorts_fields() {
        assert_eq!(cache_embedding_text("refund order", &["orderId".to_string(), "amount".to_string()]), "refund order amount orderId");
    }
}
