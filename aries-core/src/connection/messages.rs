use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{self, Value};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::agent::message::{
    decode_message, encode_message, generate_id, DidCommMessage, ThreadDecorator,
    MESSAGE_TYPE_FIELD,
};
use crate::agent::types::MessageError;
use crate::impl_didcomm_message;
use crate::routing::Routing;

pub const DID_DOC_CONTEXT: &str = "https://w3id.org/did/v1";
pub const INVITATION_URL_PARAM: &str = "c_i";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PublicKey {
    pub id: String,

    #[serde(rename = "type")]
    pub key_type: String,

    pub controller: String,

    #[serde(rename = "publicKeyBase58")]
    pub public_key_base58: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct DidCommService {
    pub id: String,

    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,

    #[serde(rename = "recipientKeys", default)]
    pub recipient_keys: Vec<String>,

    #[serde(rename = "routingKeys", default)]
    pub routing_keys: Vec<String>,

    #[serde(default)]
    pub priority: u32,
}

/// `DidDoc` is the peer DID document exchanged during the connection handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct DidDoc {
    #[serde(rename = "@context")]
    pub context: String,

    pub id: String,

    #[serde(rename = "publicKey", default)]
    pub public_key: Vec<PublicKey>,

    #[serde(default)]
    pub service: Vec<DidCommService>,
}

impl DidDoc {
    pub fn new(did: &str, verkey: &str, routing: &Routing) -> Self {
        let public_key = PublicKey {
            id: format!("{}#1", did),
            key_type: "Ed25519VerificationKey2018".to_string(),
            controller: did.to_string(),
            public_key_base58: verkey.to_string(),
        };

        let service = routing
            .endpoint
            .as_ref()
            .map(|endpoint| DidCommService {
                id: format!("{};indy", did),
                service_type: "IndyAgent".to_string(),
                service_endpoint: endpoint.to_owned(),
                recipient_keys: vec![verkey.to_string()],
                routing_keys: routing.routing_keys.to_owned(),
                priority: 0,
            })
            .into_iter()
            .collect();

        Self {
            context: DID_DOC_CONTEXT.to_string(),
            id: did.to_string(),
            public_key: vec![public_key],
            service,
        }
    }

    pub fn recipient_key(&self) -> Option<String> {
        self.service
            .iter()
            .flat_map(|service| service.recipient_keys.iter())
            .next()
            .or_else(|| self.public_key.first().map(|key| &key.public_key_base58))
            .cloned()
    }

    pub fn service_endpoint(&self) -> Option<String> {
        self.service
            .iter()
            .min_by_key(|service| service.priority)
            .map(|service| service.service_endpoint.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Connection {
    #[serde(rename = "DID")]
    pub did: String,

    #[serde(rename = "DIDDoc", default, skip_serializing_if = "Option::is_none")]
    pub did_doc: Option<DidDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionInvitationMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub label: String,

    #[serde(rename = "recipientKeys", default, skip_serializing_if = "Vec::is_empty")]
    pub recipient_keys: Vec<String>,

    #[serde(rename = "serviceEndpoint", default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,

    #[serde(rename = "routingKeys", default, skip_serializing_if = "Vec::is_empty")]
    pub routing_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,

    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl_didcomm_message!(
    ConnectionInvitationMessage,
    "https://didcomm.org/connections/1.0/invitation"
);

impl ConnectionInvitationMessage {
    pub fn new(label: String, recipient_keys: Vec<String>, routing: &Routing) -> Self {
        Self {
            id: generate_id(),
            thread: None,
            label,
            recipient_keys,
            service_endpoint: routing.endpoint.to_owned(),
            routing_keys: routing.routing_keys.to_owned(),
            did: None,
            image_url: None,
        }
    }

    /// `validate` requires either a public DID or inline keys with an endpoint
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.did.is_some() {
            return Ok(());
        }

        if self.recipient_keys.is_empty() {
            return Err(MessageError::DecodeError(
                "invitation: recipientKeys is missing".to_string(),
            ));
        }

        if self.service_endpoint.is_none() {
            return Err(MessageError::DecodeError(
                "invitation: serviceEndpoint is missing".to_string(),
            ));
        }

        Ok(())
    }

    pub fn to_url(&self, domain: &str) -> Result<String, MessageError> {
        let encoded = encode_message(self)?;
        let json = serde_json::to_string(&encoded)
            .map_err(|err| MessageError::EncodeError(err.to_string()))?;

        Ok(format!(
            "{}?{}={}",
            domain,
            INVITATION_URL_PARAM,
            URL_SAFE_NO_PAD.encode(json.as_bytes())
        ))
    }

    /// `from_url` accepts the base64 invitation in either the url safe or the standard alphabet,
    /// padded or not, percent encoded or not
    pub fn from_url(url: &str) -> Result<Self, MessageError> {
        let query = url
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or_else(|| MessageError::DecodeError("invitation url has no query".to_string()))?;

        let prefix = format!("{}=", INVITATION_URL_PARAM);
        let encoded = query
            .split('&')
            .find_map(|param| param.strip_prefix(prefix.as_str()))
            .ok_or_else(|| {
                MessageError::DecodeError(format!(
                    "invitation url has no {} parameter",
                    INVITATION_URL_PARAM
                ))
            })?;

        let normalized = encoded
            .replace("%3D", "=")
            .replace("%2B", "+")
            .replace("%2F", "/")
            .trim_end_matches('=')
            .replace('+', "-")
            .replace('/', "_");

        let decoded = URL_SAFE_NO_PAD
            .decode(normalized.as_bytes())
            .map_err(|err| MessageError::DecodeError(err.to_string()))?;

        let value: Value = serde_json::from_slice(&decoded)
            .map_err(|err| MessageError::DecodeError(err.to_string()))?;

        match value.get(MESSAGE_TYPE_FIELD).and_then(Value::as_str) {
            Some(message_type) if message_type == Self::MESSAGE_TYPE => {}
            Some(message_type) => {
                return Err(MessageError::UnexpectedMessage {
                    expected: Self::MESSAGE_TYPE.to_string(),
                    actual: message_type.to_string(),
                })
            }
            None => return Err(MessageError::MissingMessageType),
        }

        let invitation = decode_message::<Self>(value)?;
        invitation.validate()?;
        Ok(invitation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionRequestMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub label: String,

    pub connection: Connection,

    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl_didcomm_message!(
    ConnectionRequestMessage,
    "https://didcomm.org/connections/1.0/request"
);

/// `ConnectionResponseMessage` carries the inviter's connection unsigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ConnectionResponseMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub connection: Connection,
}

impl_didcomm_message!(
    ConnectionResponseMessage,
    "https://didcomm.org/connections/1.0/response"
);

fn default_response_requested() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct TrustPingMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default = "default_response_requested")]
    pub response_requested: bool,
}

impl_didcomm_message!(TrustPingMessage, "https://didcomm.org/trust_ping/1.0/ping");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct TrustPingResponseMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl_didcomm_message!(
    TrustPingResponseMessage,
    "https://didcomm.org/trust_ping/1.0/ping_response"
);

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn build_invitation() -> ConnectionInvitationMessage {
        let routing = Routing {
            endpoint: Some("https://agent.example.com".to_string()),
            routing_keys: vec![],
            mediator_id: None,
        };

        ConnectionInvitationMessage::new(
            "faber".to_string(),
            vec!["8HH5gYEeNc3z7PYXmd54d4x6qAfCNrqQqEB3nS7Zfu7K".to_string()],
            &routing,
        )
    }

    #[test]
    fn test_invitation_url() {
        let invitation = build_invitation();

        let url = invitation.to_url("https://agent.example.com");
        assert!(!url.is_err());

        let url = url.unwrap();
        assert!(url.starts_with("https://agent.example.com?c_i="));

        let parsed = ConnectionInvitationMessage::from_url(&url);
        assert!(!parsed.is_err());
        assert_eq!(parsed.unwrap(), invitation)
    }

    #[test]
    fn test_invitation_url_standard_alphabet() {
        let invitation = build_invitation();
        let encoded = encode_message(&invitation).unwrap();
        let payload = STANDARD.encode(serde_json::to_string(&encoded).unwrap());

        let url = format!("https://example.com/ssi?c_i={}", payload.replace('=', "%3D"));
        let parsed = ConnectionInvitationMessage::from_url(&url);
        assert!(!parsed.is_err());
        assert_eq!(parsed.unwrap().label, "faber".to_string())
    }

    #[test]
    fn test_invitation_url_missing_param() {
        let parsed = ConnectionInvitationMessage::from_url("https://example.com/ssi?d_m=abc");
        assert!(matches!(parsed.unwrap_err(), MessageError::DecodeError(_)))
    }

    #[test]
    fn test_invitation_url_wrong_type() {
        let payload = URL_SAFE_NO_PAD.encode(
            "{\"@type\":\"https://didcomm.org/basicmessage/1.0/message\",\"@id\":\"1\"}",
        );

        let parsed =
            ConnectionInvitationMessage::from_url(&format!("https://example.com?c_i={}", payload));
        assert!(matches!(
            parsed.unwrap_err(),
            MessageError::UnexpectedMessage { .. }
        ))
    }

    #[test]
    fn test_invitation_validation() {
        let mut invitation = build_invitation();
        invitation.service_endpoint = None;
        assert!(invitation.validate().is_err());

        invitation.did = Some("did:sov:LjgpST2rjsoxYegQDRm7EL".to_string());
        assert!(!invitation.validate().is_err())
    }

    #[test]
    fn test_did_doc_keys() {
        let routing = Routing {
            endpoint: Some("https://agent.example.com".to_string()),
            routing_keys: vec!["routing-key".to_string()],
            mediator_id: None,
        };

        let doc = DidDoc::new("did:sov:1", "verkey-1", &routing);
        assert_eq!(doc.recipient_key(), Some("verkey-1".to_string()));
        assert_eq!(
            doc.service_endpoint(),
            Some("https://agent.example.com".to_string())
        );

        let without_endpoint = DidDoc::new("did:sov:1", "verkey-1", &Routing::default());
        assert!(without_endpoint.service.is_empty());
        assert_eq!(without_endpoint.recipient_key(), Some("verkey-1".to_string()))
    }

    #[test]
    fn test_trust_ping_default_response_requested() {
        let ping: TrustPingMessage = serde_json::from_str("{\"@id\":\"ping-1\"}").unwrap();
        assert!(ping.response_requested);
        assert_eq!(ping.get_thread_id(), "ping-1".to_string())
    }
}
