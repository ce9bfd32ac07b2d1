use crate::errors::ClientError;
use crate::model::{LifecycleState, SearchResult};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::error;

/// Payload delivered to event handlers. Payloads are owned copies of
/// derived data, never references into live client state.
#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Auth,
    /// Freshly captured QR image bytes.
    Qr(Vec<u8>),
    /// Whether the chat list is still loading.
    Loading(bool),
    LoggedIn,
    LoggedOut,
    /// Chats currently carrying an unread indicator.
    UnreadChat(Vec<SearchResult>),
    /// Fired every poll cycle with the current state.
    Tick(LifecycleState),
    /// Human-readable error description.
    Error(String),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Start => EventKind::Start,
            Event::Auth => EventKind::Auth,
            Event::Qr(_) => EventKind::Qr,
            Event::Loading(_) => EventKind::Loading,
            Event::LoggedIn => EventKind::LoggedIn,
            Event::LoggedOut => EventKind::LoggedOut,
            Event::UnreadChat(_) => EventKind::UnreadChat,
            Event::Tick(_) => EventKind::Tick,
            Event::Error(_) => EventKind::Error,
        }
    }
}

/// Name of an event in the fixed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Auth,
    Qr,
    Loading,
    LoggedIn,
    LoggedOut,
    UnreadChat,
    Tick,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "on_start",
            EventKind::Auth => "on_auth",
            EventKind::Qr => "on_qr",
            EventKind::Loading => "on_loading",
            EventKind::LoggedIn => "on_logged_in",
            EventKind::LoggedOut => "on_logged_out",
            EventKind::UnreadChat => "on_unread_chat",
            EventKind::Tick => "on_tick",
            EventKind::Error => "on_error",
        }
    }
}

impl FromStr for EventKind {
    type Err = ClientError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "on_start" => Ok(EventKind::Start),
            "on_auth" => Ok(EventKind::Auth),
            "on_qr" => Ok(EventKind::Qr),
            "on_loading" => Ok(EventKind::Loading),
            "on_logged_in" => Ok(EventKind::LoggedIn),
            "on_logged_out" => Ok(EventKind::LoggedOut),
            "on_unread_chat" => Ok(EventKind::UnreadChat),
            "on_tick" => Ok(EventKind::Tick),
            "on_error" => Ok(EventKind::Error),
            other => Err(ClientError::UnknownEvent(other.to_string())),
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;
type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

#[derive(Clone)]
struct Registration {
    handler: Handler,
    filter: Option<Filter>,
}

/// Registry of named events and their asynchronous handlers.
///
/// Handlers for one emission run to completion in registration order before
/// `emit` returns, so the automation loop never overlaps two emissions. A
/// failing handler is reported through `on_error` and does not abort the
/// remaining handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Registration is append-only for the lifetime of
    /// the bus.
    pub fn on<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(kind, handler, None);
    }

    /// Register a handler that only runs when `filter` accepts the payload.
    pub fn on_filtered<F, Fut, P>(&self, kind: EventKind, handler: F, filter: P)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        P: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.register(kind, handler, Some(Arc::new(filter)));
    }

    fn register<F, Fut>(&self, kind: EventKind, handler: F, filter: Option<Filter>)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers
            .write()
            .expect("event registry poisoned")
            .entry(kind)
            .or_default()
            .push(Registration { handler, filter });
    }

    /// Invoke every registered handler whose filter accepts the payload,
    /// in registration order, and settle them all before returning.
    pub async fn emit(&self, event: Event) {
        let failures = self.run(&event).await;
        if event.kind() == EventKind::Error {
            // failures of on_error handlers were already logged; re-emitting
            // them would recurse
            return;
        }
        for description in failures {
            let _ = self.run(&Event::Error(description)).await;
        }
    }

    async fn run(&self, event: &Event) -> Vec<String> {
        let entries: Vec<Registration> = {
            let handlers = self.handlers.read().expect("event registry poisoned");
            handlers.get(&event.kind()).cloned().unwrap_or_default()
        };

        let mut failures = Vec::new();
        for entry in entries {
            if let Some(filter) = &entry.filter {
                if !filter(event) {
                    continue;
                }
            }
            if let Err(err) = (entry.handler)(event.clone()).await {
                error!(event = event.kind().as_str(), "event handler failed: {err:#}");
                failures.push(format!(
                    "handler for {} failed: {err:#}",
                    event.kind().as_str()
                ));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn log_sink() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = log_sink();

        let first = log.clone();
        bus.on(EventKind::Tick, move |_| {
            let first = first.clone();
            async move {
                // suspend so an out-of-order second handler would overtake
                tokio::time::sleep(Duration::from_millis(20)).await;
                first.lock().unwrap().push("h1");
                Ok(())
            }
        });

        let second = log.clone();
        bus.on(EventKind::Tick, move |_| {
            let second = second.clone();
            async move {
                second.lock().unwrap().push("h2");
                Ok(())
            }
        });

        bus.emit(Event::Tick(LifecycleState::Unknown)).await;
        assert_eq!(*log.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn failing_handler_reports_and_does_not_abort() {
        let bus = EventBus::new();
        let log = log_sink();

        bus.on(EventKind::Tick, |_| async {
            let boom: anyhow::Result<()> = Err(anyhow::anyhow!("boom"));
            boom
        });

        let survivor = log.clone();
        bus.on(EventKind::Tick, move |_| {
            let survivor = survivor.clone();
            async move {
                survivor.lock().unwrap().push("survivor");
                Ok(())
            }
        });

        let errors = log.clone();
        bus.on(EventKind::Error, move |event| {
            let errors = errors.clone();
            async move {
                if let Event::Error(description) = event {
                    assert!(description.contains("boom"));
                    errors.lock().unwrap().push("on_error");
                }
                Ok(())
            }
        });

        bus.emit(Event::Tick(LifecycleState::Unknown)).await;
        assert_eq!(*log.lock().unwrap(), vec!["survivor", "on_error"]);
    }

    #[tokio::test]
    async fn filters_gate_delivery() {
        let bus = EventBus::new();
        let log = log_sink();

        let sink = log.clone();
        bus.on_filtered(
            EventKind::Loading,
            move |_| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push("loading");
                    Ok(())
                }
            },
            |event| matches!(event, Event::Loading(true)),
        );

        bus.emit(Event::Loading(false)).await;
        assert!(log.lock().unwrap().is_empty());

        bus.emit(Event::Loading(true)).await;
        assert_eq!(*log.lock().unwrap(), vec!["loading"]);
    }

    #[test]
    fn event_names_round_trip() {
        for kind in [
            EventKind::Start,
            EventKind::Auth,
            EventKind::Qr,
            EventKind::Loading,
            EventKind::LoggedIn,
            EventKind::LoggedOut,
            EventKind::UnreadChat,
            EventKind::Tick,
            EventKind::Error,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("on_message".parse::<EventKind>().is_err());
    }
}
