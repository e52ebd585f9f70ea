// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Grounding specs: annotated example actions used to constrain and validate
//! plan generation.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z0-9][a-z0-9.-]*[a-z0-9]$").expect("static regex is valid")
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseCase {
    pub action: String,
    pub params: Vec<String>,
    pub capabilities: Vec<String>,
    pub intent: String,
}

impl UseCase {
    /// `{placeholder}` names referenced in `action`.
    pub fn placeholders(&self) -> Vec<String> {
        placeholders_in(&self.action)
    }

    /// Validate every `{placeholder}` referenced by `action` is declared in
    /// `params`.
    pub fn validate(&self) -> Result<(), CoreError> {
        for placeholder in self.placeholders() {
            if !self.params.iter().any(|p| p == &placeholder) {
                return Err(CoreError::Validation {
                    field: "useCases.action".to_string(),
                    message: format!(
                        "placeholder {{{placeholder}}} has no matching entry in params"
                    ),
                });
            }
        }
        Ok(())
    }

    /// The action text with every `{placeholder}` removed, used to compare
    /// an incoming action against this use-case's semantic shape.
    pub fn action_without_placeholders(&self) -> String {
        strip_placeholders(&self.action)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingSpec {
    pub name: String,
    pub domain: String,
    pub version: u32,
    pub use_cases: Vec<UseCase>,
    pub constraints: Vec<String>,
}

impl GroundingSpec {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_name("name", &self.name)?;
        validate_name("domain", &self.domain)?;
        for use_case in &self.use_cases {
            use_case.validate()?;
        }
        Ok(())
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), CoreError> {
    if !(3..=63).contains(&value.len()) {
        return Err(CoreError::Validation {
            field: field.to_string(),
            message: format!("{value:?} must be 3-63 characters"),
        });
    }
    if !name_regex().is_match(value) {
        return Err(CoreError::Validation {
            field: field.to_string(),
            message: format!("{value:?} must match ^[a-z0-9][a-z0-9.-]*[a-z0-9]$"),
        });
    }
    Ok(())
}

fn placeholders_in(action: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = action.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c == '{' {
            if let Some(end) = action[start + 1..].find('}') {
                names.push(action[start + 1..start + 1 + end].to_string());
            }
        }
    }
    names
}

fn strip_placeholders(action: &str) -> String {
    let mut out = String::with_capacity(action.len());
    let mut in_placeholder = false;
    for c in action.chars() {
        match c {
            '{' => in_placeholder = true,
            '}' => in_placeholder = false,
            _ if !in_placeholder => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn use_case(action: &str, params: &[&str]) -> UseCase {
        UseCase {
            action: action.to_string(),
            params: params.iter().map(|s| s.to_string()).collect(),
            capabilities: vec![],
            intent: "refund".to_string(),
        }
    }

    #[test]
    fn placeholder_must_be_declared_in_params() {
        assert!(use_case("Refund {orderId}", &["orderId"]).validate().is_ok());
        assert!(use_case("Refund {orderId}", &[]).validate().is_err());
    }

    #[test]
    fn strips_placeholders_for_comparison() {
        let uc = use_case("Refund {orderId} for {customer}", &["orderId", "customer"]);
        assert_eq!(uc.action_without_placeholders(), "Refund  for");
    }

    #[test]
    fn grounding_spec_name_domain_rules() {
        let spec = GroundingSpec {
            name: "refunds".to_string(),
            domain: "ecommerce.refunds".to_string(),
            version: 1,
            use_cases: vec![use_case("Refund {orderId}", &["orderId"])],
            constraints: vec![],
        };
        assert!(spec.validate().is_ok());

        let bad = GroundingSpec { name: "ab".to_string(), ..spec };
        assert!(bad.validate().is_err());
    }
}
