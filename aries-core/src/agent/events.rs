use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use rst_common::with_errors::thiserror::{self, Error};
use rst_common::with_logging::log::{debug, error, warn};
use rst_common::with_tokio::tokio::sync::broadcast::{self, error::RecvError};

use crate::basicmessage::BasicMessageRecord;
use crate::connection::ConnectionRecord;
use crate::credentials::CredentialExchangeRecord;
use crate::proofs::ProofExchangeRecord;
use crate::routing::MediationRecord;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, PartialEq, Error, Clone)]
pub enum EventBusError {
    #[error("subscriber error: {0}")]
    SubscriberError(String),

    #[error("event bus closed")]
    Closed,

    #[error("listener lagged, {0} events skipped")]
    Lagged(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEvent {
    pub record: ConnectionRecord,
}

/// `TrustPingResponseEvent` is published when a ping response arrives, the connection record
/// itself does not change
#[derive(Debug, Clone, PartialEq)]
pub struct TrustPingResponseEvent {
    pub record: ConnectionRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialEvent {
    pub record: CredentialExchangeRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProofEvent {
    pub record: ProofExchangeRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicMessageEvent {
    pub record: BasicMessageRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediationEvent {
    pub record: MediationRecord,
}

/// `AgentEvent` carries an immutable snapshot of the record taken right after the transition
/// was persisted
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Connection(ConnectionEvent),
    TrustPingResponse(TrustPingResponseEvent),
    Credential(CredentialEvent),
    Proof(ProofEvent),
    BasicMessage(BasicMessageEvent),
    Mediation(MediationEvent),
}

/// `EventKind` selects one event variant out of [`AgentEvent`]
pub trait EventKind: Clone + Send + Sync + 'static {
    fn select(event: &AgentEvent) -> Option<&Self>;
}

macro_rules! event_kinds {
    ($($variant:ident($event:ty)),+ $(,)?) => {
        $(
            impl EventKind for $event {
                fn select(event: &AgentEvent) -> Option<&Self> {
                    match event {
                        AgentEvent::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$event> for AgentEvent {
                fn from(event: $event) -> Self {
                    AgentEvent::$variant(event)
                }
            }
        )+
    };
}

event_kinds! {
    Connection(ConnectionEvent),
    TrustPingResponse(TrustPingResponseEvent),
    Credential(CredentialEvent),
    Proof(ProofEvent),
    BasicMessage(BasicMessageEvent),
    Mediation(MediationEvent),
}

type Handler = Arc<dyn Fn(&AgentEvent) -> Result<(), EventBusError> + Send + Sync>;

struct SubscriberEntry {
    id: u64,
    handler: Handler,
}

type Subscribers = Arc<Mutex<Vec<SubscriberEntry>>>;

/// `Subscription` detaches its handler from the bus when cancelled
///
/// Dropping a subscription does not cancel it.
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Vec<SubscriberEntry>>>,
    cancelled: AtomicBool,
}

impl Subscription {
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(subscribers) = self.subscribers.upgrade() {
            let mut entries = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|entry| entry.id != self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// `EventStream` is an asynchronous listener over every published event
pub struct EventStream {
    receiver: Option<broadcast::Receiver<AgentEvent>>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Result<AgentEvent, EventBusError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await.map_err(|err| match err {
                RecvError::Closed => EventBusError::Closed,
                RecvError::Lagged(skipped) => EventBusError::Lagged(skipped),
            }),
            None => Err(EventBusError::Closed),
        }
    }

    /// `next_event` waits for the next event of the given kind, skipping the others
    pub async fn next_event<T: EventKind>(&mut self) -> Result<T, EventBusError> {
        loop {
            let event = self.recv().await?;
            if let Some(selected) = T::select(&event) {
                return Ok(selected.clone());
            }
        }
    }
}

/// `EventBus` fans out record snapshots to in-process subscribers
///
/// Synchronous subscribers are invoked in subscription order on the publishing task. A failing
/// or panicking subscriber is logged and never affects the publisher or the other subscribers.
/// Asynchronous listeners obtained from [`EventBus::listen`] read the same events from a bounded
/// broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Subscribers,
    next_id: Arc<AtomicU64>,
    sender: Arc<RwLock<Option<broadcast::Sender<AgentEvent>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            sender: Arc::new(RwLock::new(Some(sender))),
        }
    }

    pub fn subscribe<T, F>(&self, handler: F) -> Subscription
    where
        T: EventKind,
        F: Fn(&T) -> Result<(), EventBusError> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handler: Handler = Arc::new(move |event: &AgentEvent| match T::select(event) {
            Some(selected) => handler(selected),
            None => Ok(()),
        });

        let mut entries = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.push(SubscriberEntry { id, handler });

        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn listen(&self) -> EventStream {
        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        EventStream {
            receiver: sender.as_ref().map(|tx| tx.subscribe()),
        }
    }

    pub fn publish(&self, event: impl Into<AgentEvent>) {
        let event = event.into();

        let handlers: Vec<Handler> = {
            let entries = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            entries.iter().map(|entry| entry.handler.clone()).collect()
        };

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!("event bus: subscriber failed: {}", err),
                Err(_) => error!("event bus: subscriber panicked"),
            }
        }

        let sender = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => {
                // no active listener is not an error
                let _ = tx.send(event);
            }
            None => debug!("event bus: closed, listeners skipped"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `close` ends every listener stream, synchronous subscribers stay attached
    pub fn close(&self) {
        let mut sender = self.sender.write().unwrap_or_else(PoisonError::into_inner);
        sender.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use rst_common::with_tokio::tokio;

    use crate::basicmessage::{BasicMessage, BasicMessageRecord, BasicMessageRole};

    fn build_event(content: &str) -> BasicMessageEvent {
        let message = BasicMessage::new(content.to_string());
        BasicMessageEvent {
            record: BasicMessageRecord::new("conn-1".to_string(), BasicMessageRole::Sender, &message),
        }
    }

    #[test]
    fn test_subscribers_called_in_order() {
        let bus = EventBus::default();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = calls.clone();
        let _sub1 = bus.subscribe::<BasicMessageEvent, _>(move |_| {
            first.lock().unwrap().push("first");
            Ok(())
        });

        let second = calls.clone();
        let _sub2 = bus.subscribe::<BasicMessageEvent, _>(move |_| {
            second.lock().unwrap().push("second");
            Ok(())
        });

        bus.publish(build_event("hello"));
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"])
    }

    #[test]
    fn test_subscriber_only_receives_its_kind() {
        let bus = EventBus::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let cloned = counter.clone();
        let _sub = bus.subscribe::<CredentialEvent, _>(move |_| {
            cloned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(build_event("hello"));
        assert_eq!(counter.load(Ordering::SeqCst), 0)
    }

    #[test]
    fn test_failing_subscriber_isolated() {
        let bus = EventBus::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let _failing = bus.subscribe::<BasicMessageEvent, _>(|_| {
            Err(EventBusError::SubscriberError("boom".to_string()))
        });
        let _panicking =
            bus.subscribe::<BasicMessageEvent, _>(|_| panic!("subscriber panicked on purpose"));

        let cloned = counter.clone();
        let _healthy = bus.subscribe::<BasicMessageEvent, _>(move |_| {
            cloned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(build_event("hello"));
        bus.publish(build_event("again"));
        assert_eq!(counter.load(Ordering::SeqCst), 2)
    }

    #[test]
    fn test_cancel_subscription() {
        let bus = EventBus::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let cloned = counter.clone();
        let sub = bus.subscribe::<BasicMessageEvent, _>(move |_| {
            cloned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish(build_event("first"));
        sub.cancel();
        sub.cancel();
        bus.publish(build_event("second"));

        assert!(sub.is_cancelled());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1)
    }

    #[test]
    fn test_drop_does_not_cancel() {
        let bus = EventBus::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let cloned = counter.clone();
        {
            let _sub = bus.subscribe::<BasicMessageEvent, _>(move |_| {
                cloned.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        bus.publish(build_event("hello"));
        assert_eq!(counter.load(Ordering::SeqCst), 1)
    }

    #[tokio::test]
    async fn test_listen_receives_snapshot() {
        let bus = EventBus::default();
        let mut stream = bus.listen();

        let event = build_event("hello");
        bus.publish(event.clone());

        let received = stream.next_event::<BasicMessageEvent>().await;
        assert!(!received.is_err());
        assert_eq!(received.unwrap(), event)
    }

    #[tokio::test]
    async fn test_listen_after_close() {
        let bus = EventBus::default();
        let mut stream = bus.listen();

        bus.close();
        let received = stream.recv().await;
        assert!(matches!(received.unwrap_err(), EventBusError::Closed));

        let mut late = bus.listen();
        assert!(matches!(late.recv().await.unwrap_err(), EventBusError::Closed))
    }
}
