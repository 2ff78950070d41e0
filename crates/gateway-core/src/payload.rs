use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Pre-encoded heartbeat frame; written on every ping tick.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Pre-encoded terminal frame; attempted once on every connection exit.
pub const HANGUP_FRAME: &str = r#"{"type":"hangup"}"#;

/// Server-to-client envelope. One JSON object per WebSocket write.
///
/// The derived `PartialEq` is the change-detection predicate for preflight
/// payloads: map comparison is by key set and per-key value, independent of
/// iteration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Preflight {
        checklist: HashMap<String, bool>,
        lock_statuses: HashMap<String, bool>,
    },
    Status {
        data: String,
    },
    Ping,
    Hangup,
}

impl ServerMessage {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Client-to-server frame. Only the `type` field is inspected; everything
/// else is ignored for forward compatibility.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientMessage {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ClientMessage {
    pub fn normalized_kind(&self) -> Option<String> {
        self.kind.as_deref().map(str::to_ascii_lowercase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preflight(pairs: &[(&str, bool)], locks: &[(&str, bool)]) -> ServerMessage {
        ServerMessage::Preflight {
            checklist: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            lock_statuses: locks.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn constant_frames_match_encoded_variants() {
        assert_eq!(ServerMessage::Ping.encode().unwrap(), PING_FRAME);
        assert_eq!(ServerMessage::Hangup.encode().unwrap(), HANGUP_FRAME);
    }

    #[test]
    fn status_envelope_uses_stable_field_names() {
        let msg = ServerMessage::Status {
            data: "hello world".into(),
        };
        assert_eq!(
            msg.encode().unwrap(),
            r#"{"type":"status","data":"hello world"}"#
        );
    }

    #[test]
    fn preflight_envelope_carries_both_maps() {
        let msg = preflight(&[("wepp", true)], &[("climate", false)]);
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "preflight");
        assert_eq!(value["checklist"]["wepp"], true);
        assert_eq!(value["lock_statuses"]["climate"], false);
    }

    #[test]
    fn equality_is_reflexive_and_order_independent() {
        let a = preflight(&[("wepp", true), ("soils", false)], &[("wepp", true)]);
        let b = preflight(&[("soils", false), ("wepp", true)], &[("wepp", true)]);
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn equality_detects_value_and_key_changes() {
        let a = preflight(&[("wepp", true)], &[]);
        assert_ne!(a, preflight(&[("wepp", false)], &[]));
        assert_ne!(a, preflight(&[("soils", true)], &[]));
        assert_ne!(a, preflight(&[("wepp", true)], &[("wepp", false)]));
        assert_ne!(a, ServerMessage::Status { data: "x".into() });
    }

    #[test]
    fn client_message_tolerates_missing_type() {
        let msg: ClientMessage = serde_json::from_str("{}").unwrap();
        assert_eq!(msg.normalized_kind(), None);

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"PONG","extra":1}"#).unwrap();
        assert_eq!(msg.normalized_kind().as_deref(), Some("pong"));
    }
}
