// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `{id, payload}` envelope carried in both directions over the WebSocket
//! transport (§6 "Wire protocol over WebSocket").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub id: String,
    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self { id: id.into(), payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_roundtrips_through_json() {
        let env = Envelope::new("abc", json!({"k": "v"}));
        let text = serde_json::to_string(&env).expect("serialize");
        let back: Envelope<serde_json::Value> = serde_json::from_str(&text).expect("parse");
        assert_eq!(back.id, "abc");
        assert_eq!(back.payload, json!({"k": "v"}));
    }
}
