use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json;

use crate::agent::message::{find_attachment, AckStatus, Attachment, ThreadDecorator};
use crate::agent::types::{AgentError, MessageError};
use crate::impl_didcomm_message;

use super::types::{PresentationPreview, ProofRequest};

pub const INDY_PROOF_REQUEST_ATTACHMENT_ID: &str = "libindy-request-presentation-0";
pub const INDY_PROOF_ATTACHMENT_ID: &str = "libindy-presentation-0";

fn read_attachment(attachments: &[Attachment], id: &str) -> Result<String, AgentError> {
    let attachment = find_attachment(attachments, id)
        .ok_or_else(|| AgentError::MissingAttachment(id.to_string()))?;

    attachment.get_data_as_string().map_err(AgentError::from)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ProposePresentationMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    pub presentation_proposal: PresentationPreview,
}

impl_didcomm_message!(
    ProposePresentationMessage,
    "https://didcomm.org/present-proof/1.0/propose-presentation"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct RequestPresentationMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "request_presentations~attach")]
    pub request_attachments: Vec<Attachment>,
}

impl_didcomm_message!(
    RequestPresentationMessage,
    "https://didcomm.org/present-proof/1.0/request-presentation"
);

impl RequestPresentationMessage {
    pub fn get_proof_request_json(&self) -> Result<String, AgentError> {
        read_attachment(&self.request_attachments, INDY_PROOF_REQUEST_ATTACHMENT_ID)
    }

    pub fn get_proof_request(&self) -> Result<ProofRequest, AgentError> {
        let json = self.get_proof_request_json()?;
        serde_json::from_str(&json)
            .map_err(|err| AgentError::Message(MessageError::AttachmentError(err.to_string())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PresentationMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "presentations~attach")]
    pub presentation_attachments: Vec<Attachment>,
}

impl_didcomm_message!(
    PresentationMessage,
    "https://didcomm.org/present-proof/1.0/presentation"
);

impl PresentationMessage {
    pub fn get_proof_json(&self) -> Result<String, AgentError> {
        read_attachment(&self.presentation_attachments, INDY_PROOF_ATTACHMENT_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct PresentationAckMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub status: AckStatus,
}

impl_didcomm_message!(
    PresentationAckMessage,
    "https://didcomm.org/present-proof/1.0/ack"
);
