use rst_common::standard::chrono::{DateTime, Utc};
use rst_common::standard::serde::{self, Deserialize, Serialize};

use crate::agent::message::{generate_id, ThreadDecorator};
use crate::impl_didcomm_message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "self::serde")]
pub struct BasicMessage {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "~thread", default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadDecorator>,

    pub content: String,
    pub sent_time: DateTime<Utc>,
}

impl_didcomm_message!(BasicMessage, "https://didcomm.org/basicmessage/1.0/message");

impl BasicMessage {
    pub fn new(content: String) -> Self {
        Self {
            id: generate_id(),
            thread: None,
            content,
            sent_time: Utc::now(),
        }
    }

    /// `with_parent_thread` links the message to the exchange it replies to
    pub fn with_parent_thread(mut self, parent_thread_id: Option<String>) -> Self {
        if parent_thread_id.is_some() {
            self.thread = Some(ThreadDecorator::new(self.id.to_owned()).with_parent(parent_thread_id));
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::standard::serde_json::{self, json};

    use crate::agent::message::DidCommMessage;

    #[test]
    fn test_parent_thread() {
        let message = BasicMessage::new("hello".to_string())
            .with_parent_thread(Some("parent-1".to_string()));

        assert_eq!(message.get_thread_id(), message.id);
        assert_eq!(message.get_parent_thread_id(), Some("parent-1".to_string()));

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["~thread"]["pthid"], json!("parent-1"))
    }

    #[test]
    fn test_without_parent_thread() {
        let message = BasicMessage::new("hello".to_string()).with_parent_thread(None);
        assert!(message.thread.is_none());
        assert!(message.get_parent_thread_id().is_none())
    }
}
