//! Wire Protocol Types
//!
//! JSON records exchanged over the signaling socket. Signaling payloads
//! (`sdp`, `candidate`, `data`) are carried as opaque JSON values and never
//! inspected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

use crate::error::RelayError;

/// Client-chosen peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Validate a claimed identifier from the connect request.
    pub fn parse(raw: Option<&str>) -> Result<Self, RelayError> {
        match raw {
            Some(id) if !id.is_empty() => Ok(Self(id.to_string())),
            _ => Err(RelayError::MissingIdentity),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PeerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A point-to-point signaling record, relayed from `from` to `target`.
///
/// Fields the relay does not know about are kept in `extra` and forwarded
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignalingMessage {
    pub fn decode(frame: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(frame).map_err(|e| RelayError::DecodeFailure(e.to_string()))
    }

    /// The routing target, treating an empty string as absent.
    pub fn target(&self) -> Option<&PeerId> {
        self.target.as_ref().filter(|t| !t.is_empty())
    }

    /// Stamp the authoritative sender, discarding whatever the client claimed.
    pub fn stamp_sender(&mut self, sender: &PeerId) {
        self.from = Some(sender.clone());
    }
}

/// Directory delta carried in a presence event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceAction {
    #[serde(rename = "+")]
    Joined,
    #[serde(rename = "-")]
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub peer: PeerId,
    pub action: PresenceAction,
}

/// Messages originated by the relay itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerMessage {
    Contacts(PresenceEvent),
}

impl ServerMessage {
    pub fn joined(peer: &PeerId) -> Self {
        Self::Contacts(PresenceEvent {
            peer: peer.clone(),
            action: PresenceAction::Joined,
        })
    }

    pub fn left(peer: &PeerId) -> Self {
        Self::Contacts(PresenceEvent {
            peer: peer.clone(),
            action: PresenceAction::Left,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn peer_id_rejects_missing_and_empty() {
        assert_eq!(PeerId::parse(None), Err(RelayError::MissingIdentity));
        assert_eq!(PeerId::parse(Some("")), Err(RelayError::MissingIdentity));
        assert_eq!(PeerId::parse(Some("alice")).unwrap().as_str(), "alice");
    }

    #[test]
    fn presence_wire_shape() {
        let msg = ServerMessage::joined(&PeerId::from("alice"));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "contacts", "data": {"peer": "alice", "action": "+"}})
        );

        let msg = ServerMessage::left(&PeerId::from("bob"));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "contacts", "data": {"peer": "bob", "action": "-"}})
        );
    }

    #[test]
    fn decode_offer_keeps_payload_opaque() {
        let raw = json!({
            "type": "offer",
            "target": "bob",
            "sdp": {"type": "offer", "sdp": "v=0\r\n"},
        });
        let msg = SignalingMessage::decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(msg.kind, "offer");
        assert_eq!(msg.target().map(PeerId::as_str), Some("bob"));
        assert_eq!(msg.sdp, Some(json!({"type": "offer", "sdp": "v=0\r\n"})));
        assert!(msg.from.is_none());
    }

    #[test]
    fn empty_target_counts_as_missing() {
        let msg = SignalingMessage::decode(br#"{"type":"offer","target":""}"#).unwrap();
        assert!(msg.target().is_none());

        let msg = SignalingMessage::decode(br#"{"type":"offer"}"#).unwrap();
        assert!(msg.target().is_none());
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(
            SignalingMessage::decode(b"not json"),
            Err(RelayError::DecodeFailure(_))
        ));
        assert!(matches!(
            SignalingMessage::decode(b"[1,2,3]"),
            Err(RelayError::DecodeFailure(_))
        ));
    }

    #[test]
    fn stamp_sender_overwrites_claimed_sender() {
        let mut msg =
            SignalingMessage::decode(br#"{"type":"candidate","from":"mallory","target":"bob"}"#)
                .unwrap();
        msg.stamp_sender(&PeerId::from("alice"));
        assert_eq!(msg.from, Some(PeerId::from("alice")));
    }

    #[test]
    fn unknown_fields_survive_reencoding() {
        let msg = SignalingMessage::decode(
            br#"{"type":"custom","target":"bob","sessionId":7,"data":{"k":[1,2]}}"#,
        )
        .unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["sessionId"], json!(7));
        assert_eq!(value["data"], json!({"k": [1, 2]}));
        assert!(value.get("sdp").is_none());
    }
}
