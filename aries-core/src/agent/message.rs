use std::fmt::Debug;

use rst_common::standard::serde::de::DeserializeOwned;
use rst_common::standard::serde::{self, Deserialize, Serialize};
use rst_common::standard::serde_json::{self, Value};
use rst_common::standard::uuid::Uuid;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::types::MessageError;

pub const MESSAGE_TYPE_FIELD: &str = "@type";
pub const JSON_MIME_TYPE: &str = "application/json";

/// `generate_id` builds identifiers for records and messages
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// `ThreadDecorator` is the `~thread` decorator correlating the messages of one exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct ThreadDecorator {
    #[serde(rename = "thid", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(rename = "pthid", default, skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,
}

impl ThreadDecorator {
    pub fn new(thread_id: String) -> Self {
        Self {
            thread_id: Some(thread_id),
            parent_thread_id: None,
        }
    }

    pub fn with_parent(mut self, parent_thread_id: Option<String>) -> Self {
        self.parent_thread_id = parent_thread_id;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct AttachmentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

/// `Attachment` carries an opaque payload (credential offers, proofs) inside a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct Attachment {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "mime-type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    pub data: AttachmentData,
}

impl Attachment {
    pub fn from_data(id: &str, data: &[u8]) -> Self {
        Self {
            id: id.to_string(),
            mime_type: Some(JSON_MIME_TYPE.to_string()),
            data: AttachmentData {
                base64: Some(STANDARD.encode(data)),
                json: None,
            },
        }
    }

    pub fn get_data_as_string(&self) -> Result<String, MessageError> {
        if let Some(encoded) = &self.data.base64 {
            let decoded = STANDARD
                .decode(encoded)
                .map_err(|err| MessageError::AttachmentError(err.to_string()))?;

            return String::from_utf8(decoded)
                .map_err(|err| MessageError::AttachmentError(err.to_string()));
        }

        if let Some(json) = &self.data.json {
            return serde_json::to_string(json)
                .map_err(|err| MessageError::AttachmentError(err.to_string()));
        }

        Err(MessageError::AttachmentError(format!(
            "attachment {} has no data",
            self.id
        )))
    }
}

pub fn find_attachment<'a>(attachments: &'a [Attachment], id: &str) -> Option<&'a Attachment> {
    attachments.iter().find(|attachment| attachment.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub enum AckStatus {
    #[serde(rename = "OK")]
    Ok,

    #[serde(rename = "FAIL")]
    Fail,

    #[serde(rename = "PENDING")]
    Pending,
}

/// `DidCommMessage` is implemented by every typed protocol message
///
/// The message type URI is bound to the Rust type, the registry uses it to select the decoder
/// and the encoder writes it into the `@type` field.
pub trait DidCommMessage:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    const MESSAGE_TYPE: &'static str;

    fn get_id(&self) -> String;
    fn get_thread(&self) -> Option<&ThreadDecorator>;

    /// `get_thread_id` falls back to the message id, the first message of a thread opens it
    fn get_thread_id(&self) -> String {
        self.get_thread()
            .and_then(|thread| thread.thread_id.to_owned())
            .unwrap_or_else(|| self.get_id())
    }

    fn get_parent_thread_id(&self) -> Option<String> {
        self.get_thread()
            .and_then(|thread| thread.parent_thread_id.to_owned())
    }
}

/// `encode_message` serializes a typed message and stamps its `@type`
pub fn encode_message<T: DidCommMessage>(message: &T) -> Result<Value, MessageError> {
    let mut value =
        serde_json::to_value(message).map_err(|err| MessageError::EncodeError(err.to_string()))?;

    match value.as_object_mut() {
        Some(object) => {
            object.insert(
                MESSAGE_TYPE_FIELD.to_string(),
                Value::String(T::MESSAGE_TYPE.to_string()),
            );
            Ok(value)
        }
        None => Err(MessageError::EncodeError(format!(
            "{} is not encoded as an object",
            T::MESSAGE_TYPE
        ))),
    }
}

/// `decode_message` parses a message whose type is already known
pub fn decode_message<T: DidCommMessage>(value: Value) -> Result<T, MessageError> {
    serde_json::from_value::<T>(value)
        .map_err(|err| MessageError::DecodeError(format!("{}: {}", T::MESSAGE_TYPE, err)))
}

/// `impl_didcomm_message` binds a message struct to its type URI
///
/// The struct must expose an `id: String` field and a `thread: Option<ThreadDecorator>` field.
#[macro_export]
macro_rules! impl_didcomm_message {
    ($message:ty, $message_type:expr) => {
        impl $crate::agent::message::DidCommMessage for $message {
            const MESSAGE_TYPE: &'static str = $message_type;

            fn get_id(&self) -> String {
                self.id.to_owned()
            }

            fn get_thread(&self) -> Option<&$crate::agent::message::ThreadDecorator> {
                self.thread.as_ref()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_data() {
        let attachment = Attachment::from_data("libindy-cred-offer-0", b"{\"nonce\":\"1\"}");
        assert_eq!(attachment.mime_type, Some(JSON_MIME_TYPE.to_string()));

        let data = attachment.get_data_as_string();
        assert!(!data.is_err());
        assert_eq!(data.unwrap(), "{\"nonce\":\"1\"}".to_string())
    }

    #[test]
    fn test_attachment_invalid_base64() {
        let attachment = Attachment {
            id: "invalid".to_string(),
            mime_type: None,
            data: AttachmentData {
                base64: Some("%%%".to_string()),
                json: None,
            },
        };

        let data = attachment.get_data_as_string();
        assert!(matches!(
            data.unwrap_err(),
            MessageError::AttachmentError(_)
        ))
    }

    #[test]
    fn test_attachment_empty() {
        let attachment = Attachment {
            id: "empty".to_string(),
            mime_type: None,
            data: AttachmentData::default(),
        };

        assert!(attachment.get_data_as_string().is_err())
    }

    #[test]
    fn test_thread_decorator_serialize() {
        let thread = ThreadDecorator::new("thread-1".to_string());
        let json = serde_json::to_string(&thread).unwrap();
        assert_eq!(json, "{\"thid\":\"thread-1\"}");

        let with_parent = thread.with_parent(Some("parent-1".to_string()));
        let json = serde_json::to_string(&with_parent).unwrap();
        assert_eq!(json, "{\"thid\":\"thread-1\",\"pthid\":\"parent-1\"}")
    }
}
