use rst_common::standard::serde::{self, Deserialize, Serialize};

use crate::agent::message::{find_attachment, AckStatus, Attachment, ThreadDecorator};
use crate::agent::types::AgentError;
use crate::impl_didcomm_message;

use super::types::CredentialPreview;

pub const INDY_CREDENTIAL_OFFER_ATTACHMENT_ID: &str = "libindy-cred-offer-0";
pub const INDY_CREDENTIAL_REQUEST_ATTACHMENT_ID: &str = "libindy-cred-request-0";
pub const INDY_CREDENTIAL_ATTACHMENT_ID: &str = "libindy-cred-0";

fn read_attachment(attachments: &[Attachment], id: &str) -> Result<String, AgentError> {
    let attachment = find_attachment(attachments, id)
        .ok_or_else(|| AgentError::MissingAttachment(id.to_string()))?;

    attachment.get_data_as_string().map_err(AgentError::from)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProposeCredentialMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_proposal: Option<CredentialPreview>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_issuer_did: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred_def_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_did: Option<String>,
}

impl_didcomm_message!(
    ProposeCredentialMessage,
    "https://didcomm.org/issue-credential/1.0/propose-credential"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct OfferCredentialMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    pub credential_preview: CredentialPreview,

    #[serde(rename = "offers~attach")]
    pub offer_attachments: Vec<Attachment>,
}

impl_didcomm_message!(
    OfferCredentialMessage,
    "https://didcomm.org/issue-credential/1.0/offer-credential"
);

impl OfferCredentialMessage {
    pub fn get_credential_offer(&self) -> Result<String, AgentError> {
        read_attachment(&self.offer_attachments, INDY_CREDENTIAL_OFFER_ATTACHMENT_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RequestCredentialMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "requests~attach")]
    pub request_attachments: Vec<Attachment>,
}

impl_didcomm_message!(
    RequestCredentialMessage,
    "https://didcomm.org/issue-credential/1.0/request-credential"
);

impl RequestCredentialMessage {
    pub fn get_credential_request(&self) -> Result<String, AgentError> {
        read_attachment(&self.request_attachments, INDY_CREDENTIAL_REQUEST_ATTACHMENT_ID)
    }

    /// `assert_credential_request` fails unless the request attachment is present and decodable
    pub fn assert_credential_request(&self) -> Result<(), AgentError> {
        self.get_credential_request().map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct IssueCredentialMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "credentials~attach")]
    pub credential_attachments: Vec<Attachment>,
}

impl_didcomm_message!(
    IssueCredentialMessage,
    "https://didcomm.org/issue-credential/1.0/issue-credential"
);

impl IssueCredentialMessage {
    pub fn get_credential(&self) -> Result<String, AgentError> {
        read_attachment(&self.credential_attachments, INDY_CREDENTIAL_ATTACHMENT_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct CredentialAckMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub status: AckStatus,
}

impl_didcomm_message!(
    CredentialAckMessage,
    "https://didcomm.org/issue-credential/1.0/ack"
);

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::standard::serde_json::{self, json};

    use crate::agent::message::{encode_message, DidCommMessage};
    use crate::credentials::types::CredentialPreviewAttribute;

    #[test]
    fn test_offer_attachment() {
        let offer = OfferCredentialMessage {
            id: "offer-1".to_string(),
            thread: None,
            comment: None,
            credential_preview: CredentialPreview::new(vec![CredentialPreviewAttribute::new(
                "name", "Alice",
            )]),
            offer_attachments: vec![Attachment::from_data(
                INDY_CREDENTIAL_OFFER_ATTACHMENT_ID,
                b"{\"cred_def_id\":\"def-1\"}",
            )],
        };

        let content = offer.get_credential_offer();
        assert!(!content.is_err());
        assert_eq!(content.unwrap(), "{\"cred_def_id\":\"def-1\"}".to_string());

        let encoded = encode_message(&offer).unwrap();
        assert_eq!(encoded["@type"], json!(OfferCredentialMessage::MESSAGE_TYPE));
        assert!(encoded.get("offers~attach").is_some())
    }

    #[test]
    fn test_missing_attachment() {
        let request = RequestCredentialMessage {
            id: "request-1".to_string(),
            thread: Some(ThreadDecorator::new("offer-1".to_string())),
            comment: None,
            request_attachments: vec![],
        };

        let content = request.get_credential_request();
        assert!(matches!(
            content.unwrap_err(),
            AgentError::MissingAttachment(_)
        ));
        assert!(matches!(
            request.assert_credential_request().unwrap_err(),
            AgentError::MissingAttachment(_)
        ));
        assert_eq!(request.get_thread_id(), "offer-1".to_string())
    }

    #[test]
    fn test_ack_status_wire_format() {
        let ack = CredentialAckMessage {
            id: "ack-1".to_string(),
            thread: Some(ThreadDecorator::new("thread-1".to_string())),
            status: AckStatus::Ok,
        };

        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["status"], json!("OK"));
        assert_eq!(json["~thread"]["thid"], json!("thread-1"))
    }
}
