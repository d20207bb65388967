use std::collections::HashMap;

use rst_common::standard::serde_json::{self, Value};
use rst_common::with_logging::log::debug;

use crate::basicmessage::BasicMessage;
use crate::connection::messages::{
    ConnectionInvitationMessage, ConnectionRequestMessage, ConnectionResponseMessage,
    TrustPingMessage, TrustPingResponseMessage,
};
use crate::credentials::messages::{
    CredentialAckMessage, IssueCredentialMessage, OfferCredentialMessage,
    ProposeCredentialMessage, RequestCredentialMessage,
};
use crate::proofs::messages::{
    PresentationAckMessage, PresentationMessage, ProposePresentationMessage,
    RequestPresentationMessage,
};
use crate::routing::messages::{
    BatchMessage, BatchPickupMessage, ForwardMessage, KeylistUpdateMessage,
    KeylistUpdateResponseMessage, MediationDenyMessage, MediationGrantMessage,
    MediationRequestMessage,
};

use super::message::{decode_message, encode_message, DidCommMessage, MESSAGE_TYPE_FIELD};
use super::types::MessageError;

type Decoder = fn(Value) -> Result<AgentMessage, MessageError>;

fn decode_as<T>(value: Value) -> Result<AgentMessage, MessageError>
where
    T: DidCommMessage + Into<AgentMessage>,
{
    decode_message::<T>(value).map(Into::into)
}

macro_rules! agent_messages {
    ($($variant:ident($message:ty)),+ $(,)?) => {
        /// `AgentMessage` is the closed set of protocol messages the agent understands
        #[derive(Debug, Clone, PartialEq)]
        pub enum AgentMessage {
            $($variant($message)),+
        }

        impl AgentMessage {
            pub fn message_type(&self) -> &'static str {
                match self {
                    $(AgentMessage::$variant(_) => <$message as DidCommMessage>::MESSAGE_TYPE),+
                }
            }

            pub fn get_id(&self) -> String {
                match self {
                    $(AgentMessage::$variant(msg) => msg.get_id()),+
                }
            }

            pub fn get_thread_id(&self) -> String {
                match self {
                    $(AgentMessage::$variant(msg) => msg.get_thread_id()),+
                }
            }

            pub fn get_parent_thread_id(&self) -> Option<String> {
                match self {
                    $(AgentMessage::$variant(msg) => msg.get_parent_thread_id()),+
                }
            }

            fn encode_value(&self) -> Result<Value, MessageError> {
                match self {
                    $(AgentMessage::$variant(msg) => encode_message(msg)),+
                }
            }
        }

        $(
            impl From<$message> for AgentMessage {
                fn from(message: $message) -> Self {
                    AgentMessage::$variant(message)
                }
            }

            impl TryFrom<AgentMessage> for $message {
                type Error = MessageError;

                fn try_from(value: AgentMessage) -> Result<Self, Self::Error> {
                    match value {
                        AgentMessage::$variant(message) => Ok(message),
                        other => Err(MessageError::UnexpectedMessage {
                            expected: <$message as DidCommMessage>::MESSAGE_TYPE.to_string(),
                            actual: other.message_type().to_string(),
                        }),
                    }
                }
            }
        )+

        fn builtin_decoders() -> Vec<(&'static str, Decoder)> {
            vec![
                $((<$message as DidCommMessage>::MESSAGE_TYPE, decode_as::<$message> as Decoder)),+
            ]
        }
    };
}

agent_messages! {
    ConnectionInvitation(ConnectionInvitationMessage),
    ConnectionRequest(ConnectionRequestMessage),
    ConnectionResponse(ConnectionResponseMessage),
    TrustPing(TrustPingMessage),
    TrustPingResponse(TrustPingResponseMessage),
    ProposeCredential(ProposeCredentialMessage),
    OfferCredential(OfferCredentialMessage),
    RequestCredential(RequestCredentialMessage),
    IssueCredential(IssueCredentialMessage),
    CredentialAck(CredentialAckMessage),
    ProposePresentation(ProposePresentationMessage),
    RequestPresentation(RequestPresentationMessage),
    Presentation(PresentationMessage),
    PresentationAck(PresentationAckMessage),
    BasicMessage(BasicMessage),
    MediationRequest(MediationRequestMessage),
    MediationGrant(MediationGrantMessage),
    MediationDeny(MediationDenyMessage),
    KeylistUpdate(KeylistUpdateMessage),
    KeylistUpdateResponse(KeylistUpdateResponseMessage),
    Forward(ForwardMessage),
    BatchPickup(BatchPickupMessage),
    Batch(BatchMessage),
}

/// `MessageRegistry` maps a message type URI to the decoder of its Rust type
///
/// Registration happens while the agent initializes, decoding afterwards only reads the map.
#[derive(Clone, Default)]
pub struct MessageRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `register` is idempotent, registering the same type twice keeps a single entry
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: DidCommMessage + Into<AgentMessage>,
    {
        self.decoders.insert(T::MESSAGE_TYPE, decode_as::<T>);
        self
    }

    /// `register_builtin` registers every message of the supported protocols
    pub fn register_builtin(&mut self) -> &mut Self {
        for (message_type, decoder) in builtin_decoders() {
            self.decoders.insert(message_type, decoder);
        }

        debug!("registry: {} message types registered", self.decoders.len());
        self
    }

    pub fn is_registered(&self, message_type: &str) -> bool {
        self.decoders.contains_key(message_type)
    }

    pub fn decode(&self, raw: &str) -> Result<AgentMessage, MessageError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| MessageError::DecodeError(err.to_string()))?;

        self.decode_value(value)
    }

    pub fn decode_value(&self, value: Value) -> Result<AgentMessage, MessageError> {
        let message_type = value
            .get(MESSAGE_TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingMessageType)?
            .to_string();

        let decoder = self
            .decoders
            .get(message_type.as_str())
            .ok_or_else(|| MessageError::UnknownMessageType(message_type.to_owned()))?;

        decoder(value)
    }

    pub fn encode(message: &AgentMessage) -> Result<String, MessageError> {
        let value = message.encode_value()?;
        serde_json::to_string(&value).map_err(|err| MessageError::EncodeError(err.to_string()))
    }

    pub fn encode_value(message: &AgentMessage) -> Result<Value, MessageError> {
        message.encode_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rst_common::standard::serde_json::json;

    use crate::agent::message::ThreadDecorator;

    #[test]
    fn test_decode_registered_message() {
        let mut registry = MessageRegistry::new();
        registry.register::<BasicMessage>();

        let raw = json!({
            "@type": "https://didcomm.org/basicmessage/1.0/message",
            "@id": "msg-1",
            "content": "hello",
            "sent_time": "2024-01-01T00:00:00Z"
        });

        let decoded = registry.decode(&raw.to_string());
        assert!(!decoded.is_err());

        let message = decoded.unwrap();
        assert_eq!(message.message_type(), BasicMessage::MESSAGE_TYPE);
        assert_eq!(message.get_id(), "msg-1".to_string());
        assert_eq!(message.get_thread_id(), "msg-1".to_string());

        let basic: BasicMessage = message.try_into().unwrap();
        assert_eq!(basic.content, "hello".to_string())
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut registry = MessageRegistry::new();
        registry.register::<BasicMessage>();

        let raw = json!({"@type": "https://didcomm.org/unknown/1.0/message", "@id": "1"});
        let decoded = registry.decode(&raw.to_string());
        assert!(decoded.is_err());
        assert!(matches!(
            decoded.unwrap_err(),
            MessageError::UnknownMessageType(_)
        ))
    }

    #[test]
    fn test_decode_missing_type() {
        let registry = MessageRegistry::new();
        let decoded = registry.decode("{\"@id\": \"1\"}");
        assert!(matches!(
            decoded.unwrap_err(),
            MessageError::MissingMessageType
        ))
    }

    #[test]
    fn test_decode_invalid_json() {
        let registry = MessageRegistry::new();
        let decoded = registry.decode("not-json");
        assert!(matches!(decoded.unwrap_err(), MessageError::DecodeError(_)))
    }

    #[test]
    fn test_decode_invalid_shape() {
        let mut registry = MessageRegistry::new();
        registry.register::<BasicMessage>();

        let raw = json!({"@type": BasicMessage::MESSAGE_TYPE, "@id": "1"});
        let decoded = registry.decode(&raw.to_string());
        assert!(matches!(decoded.unwrap_err(), MessageError::DecodeError(_)))
    }

    #[test]
    fn test_register_idempotent() {
        let mut registry = MessageRegistry::new();
        registry
            .register::<BasicMessage>()
            .register::<BasicMessage>();

        assert_eq!(registry.decoders.len(), 1);
        assert!(registry.is_registered(BasicMessage::MESSAGE_TYPE))
    }

    #[test]
    fn test_builtin_registered() {
        let mut registry = MessageRegistry::new();
        registry.register_builtin();

        assert!(registry.is_registered(OfferCredentialMessage::MESSAGE_TYPE));
        assert!(registry.is_registered(TrustPingResponseMessage::MESSAGE_TYPE));
        assert!(registry.is_registered(BatchMessage::MESSAGE_TYPE));
        assert_eq!(registry.decoders.len(), 23)
    }

    #[test]
    fn test_encode_then_decode() {
        let mut registry = MessageRegistry::new();
        registry.register_builtin();

        let mut basic = BasicMessage::new("hello".to_string());
        basic.thread = Some(ThreadDecorator::new("thread-1".to_string()));
        let message = AgentMessage::from(basic);

        let encoded = MessageRegistry::encode(&message);
        assert!(!encoded.is_err());

        let decoded = registry.decode(&encoded.unwrap());
        assert!(!decoded.is_err());
        assert_eq!(decoded.unwrap(), message)
    }

    #[test]
    fn test_try_from_wrong_variant() {
        let message = AgentMessage::from(BasicMessage::new("hello".to_string()));
        let casted = TrustPingMessage::try_from(message);
        assert!(matches!(
            casted.unwrap_err(),
            MessageError::UnexpectedMessage { .. }
        ))
    }
}
