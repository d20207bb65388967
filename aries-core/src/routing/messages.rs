use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::Value;

use crate::agent::message::ThreadDecorator;
use crate::impl_didcomm_message;

use super::types::{KeylistUpdateAction, KeylistUpdateResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationRequestMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default)]
    pub mediator_terms: Vec<String>,

    #[serde(default)]
    pub recipient_terms: Vec<String>,
}

impl_didcomm_message!(
    MediationRequestMessage,
    "https://didcomm.org/coordinate-mediation/1.0/mediate-request"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationGrantMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub endpoint: String,

    #[serde(default)]
    pub routing_keys: Vec<String>,
}

impl_didcomm_message!(
    MediationGrantMessage,
    "https://didcomm.org/coordinate-mediation/1.0/mediate-grant"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct MediationDenyMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,
}

impl_didcomm_message!(
    MediationDenyMessage,
    "https://didcomm.org/coordinate-mediation/1.0/mediate-deny"
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct KeylistUpdate {
    pub recipient_key: String,
    pub action: KeylistUpdateAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct KeylistUpdateMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub updates: Vec<KeylistUpdate>,
}

impl_didcomm_message!(
    KeylistUpdateMessage,
    "https://didcomm.org/coordinate-mediation/1.0/keylist-update"
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct KeylistUpdated {
    pub recipient_key: String,
    pub action: KeylistUpdateAction,
    pub result: KeylistUpdateResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct KeylistUpdateResponseMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub updated: Vec<KeylistUpdated>,
}

impl_didcomm_message!(
    KeylistUpdateResponseMessage,
    "https://didcomm.org/coordinate-mediation/1.0/keylist-update-response"
);

/// `ForwardMessage` wraps a packed message for the mediator holding the `to` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ForwardMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub to: String,
    pub msg: Value,
}

impl_didcomm_message!(ForwardMessage, "https://didcomm.org/routing/1.0/forward");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct BatchPickupMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub batch_size: usize,
}

impl_didcomm_message!(
    BatchPickupMessage,
    "https://didcomm.org/messagepickup/1.0/batch-pickup"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct BatchItem {
    pub id: String,
    pub message: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct BatchMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(rename = "messages~attach", default)]
    pub messages: Vec<BatchItem>,
}

impl_didcomm_message!(BatchMessage, "https://didcomm.org/messagepickup/1.0/batch");

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::standard::serde_json::{self, json};

    #[test]
    fn test_keylist_update_wire_format() {
        let message = KeylistUpdateMessage {
            id: "update-1".to_string(),
            thread: None,
            updates: vec![KeylistUpdate {
                recipient_key: "verkey-1".to_string(),
                action: KeylistUpdateAction::Add,
            }],
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json["updates"],
            json!([{"recipient_key": "verkey-1", "action": "add"}])
        )
    }

    #[test]
    fn test_batch_decode() {
        let batch: BatchMessage = serde_json::from_value(json!({
            "@id": "batch-1",
            "messages~attach": [
                {"id": "m-1", "message": {"protected": "abc"}},
                {"id": "m-2", "message": {"protected": "def"}}
            ]
        }))
        .unwrap();

        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[1].message, json!({"protected": "def"}))
    }
}
