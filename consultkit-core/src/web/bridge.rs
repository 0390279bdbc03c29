use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Page-ready signal sent by the web content.
pub const CONTENT_LOADED: &str = "contentLoaded";

/// Failures reported through the bridge's error callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The payload could not be encoded as JSON.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// The web view rejected or failed the script.
    #[error("evaluation_error: {0}")]
    Evaluation(String),
}

/// The embedded web view, as seen by the bridge.
#[async_trait]
pub trait WebContentHost: Send + Sync {
    /// Evaluates `script` in the page.
    ///
    /// # Errors
    /// Returns [`BridgeError::Evaluation`] when the page rejects the script.
    async fn evaluate_script(&self, script: String) -> Result<(), BridgeError>;

    /// Starts delivering page messages posted under `name`.
    fn add_message_handler(&self, name: &str);

    /// Stops delivering page messages posted under `name`.
    fn remove_message_handler(&self, name: &str);
}

/// Receives the JSON body of inbound messages for one name.
pub trait MessageHandler: Send + Sync {
    /// Handles one message.
    fn handle(&self, body: &Value);
}

impl<F> MessageHandler for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn handle(&self, body: &Value) {
        self(body);
    }
}

type ErrorCallback = Arc<dyn Fn(BridgeError) + Send + Sync>;
type Handlers = HashMap<String, Arc<dyn MessageHandler>>;

/// Native to web event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebEvent {
    /// Event name, as seen by `window.addEventListener`.
    pub name: String,
    /// `detail` of the dispatched event.
    pub payload: Option<Value>,
}

impl WebEvent {
    /// Event with a payload.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload: Some(payload),
        }
    }

    /// Event without a payload.
    #[must_use]
    pub fn signal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    /// Script dispatching this event on `window`.
    ///
    /// # Errors
    /// Returns [`BridgeError::Serialization`] if the event cannot be encoded.
    pub fn script(&self) -> Result<String, BridgeError> {
        let name = serde_json::to_string(&self.name)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        Ok(match &self.payload {
            Some(payload) => {
                let detail = serde_json::to_string(payload)
                    .map_err(|e| BridgeError::Serialization(e.to_string()))?;
                format!("window.dispatchEvent(new CustomEvent({name}, {{ detail: {detail} }}));")
            }
            None => format!("window.dispatchEvent(new CustomEvent({name}));"),
        })
    }
}

/// App lifecycle transitions forwarded to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LifecycleEvent {
    /// The app returned to the foreground.
    Foreground,
    /// The app moved to the background.
    Background,
}

impl LifecycleEvent {
    /// Event name seen by the page.
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Foreground => "appForeground",
            Self::Background => "appBackground",
        }
    }
}

/// Builds a [`WebBridge`] with its fixed set of inbound handlers.
pub struct WebBridgeBuilder {
    host: Arc<dyn WebContentHost>,
    handlers: Handlers,
    on_error: Option<ErrorCallback>,
}

impl WebBridgeBuilder {
    /// Routes inbound messages named `name` to `handler`.
    #[must_use]
    pub fn handle(mut self, name: impl Into<String>, handler: impl MessageHandler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Sets the callback receiving every outbound failure.
    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(BridgeError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Registers every handler name with the host once.
    #[must_use]
    pub fn attach(self) -> WebBridge {
        for name in self.handlers.keys() {
            self.host.add_message_handler(name);
        }
        log::debug!("web bridge attached with {} handlers", self.handlers.len());
        WebBridge {
            host: self.host,
            inbound: Mutex::new(Inbound {
                handlers: Some(self.handlers),
                delivering: None,
                retired: Vec::new(),
            }),
            delivery: Mutex::new(()),
            on_error: self.on_error,
        }
    }
}

/// Event channel between native code and one embedded web view.
///
/// Inbound messages are delivered one at a time. Once [`WebBridge::detach`]
/// returns no handler runs again: a detach from another thread waits for the
/// message being delivered. A handler may detach its own bridge; the host
/// registrations are then removed as soon as that handler returns.
///
/// ```
/// use std::sync::Arc;
///
/// use async_trait::async_trait;
/// use consultkit_core::web::{BridgeError, WebBridge, WebContentHost, CONTENT_LOADED};
///
/// struct Page;
///
/// #[async_trait]
/// impl WebContentHost for Page {
///     async fn evaluate_script(&self, script: String) -> Result<(), BridgeError> {
///         assert!(script.starts_with("window.dispatchEvent"));
///         Ok(())
///     }
///     fn add_message_handler(&self, _name: &str) {}
///     fn remove_message_handler(&self, _name: &str) {}
/// }
///
/// # tokio_test::block_on(async {
/// let bridge = WebBridge::builder(Arc::new(Page))
///     .handle(CONTENT_LOADED, |_: &serde_json::Value| println!("page ready"))
///     .on_error(|err| eprintln!("{err}"))
///     .attach();
/// bridge.receive(CONTENT_LOADED, "{}");
/// bridge.send("consultationUpdated", &serde_json::json!({ "id": 12 })).await;
/// # });
/// ```
pub struct WebBridge {
    host: Arc<dyn WebContentHost>,
    inbound: Mutex<Inbound>,
    delivery: Mutex<()>,
    on_error: Option<ErrorCallback>,
}

struct Inbound {
    /// `None` once detached.
    handlers: Option<Handlers>,
    /// Thread running a handler, if any.
    delivering: Option<ThreadId>,
    /// Names to unregister once the running handler returns.
    retired: Vec<String>,
}

/// Clears the delivering thread when a handler returns or panics, and removes
/// the registrations a handler retired by detaching its own bridge.
struct Delivering<'a> {
    bridge: &'a WebBridge,
}

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        let retired = {
            let mut inbound = self.bridge.inbound();
            inbound.delivering = None;
            std::mem::take(&mut inbound.retired)
        };
        self.bridge.unregister(&retired);
    }
}

impl std::fmt::Debug for WebBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebBridge")
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

impl WebBridge {
    /// Starts building a bridge for `host`.
    #[must_use]
    pub fn builder(host: Arc<dyn WebContentHost>) -> WebBridgeBuilder {
        WebBridgeBuilder {
            host,
            handlers: HashMap::new(),
            on_error: None,
        }
    }

    /// Whether the bridge still delivers messages.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inbound().handlers.is_some()
    }

    /// Delivers a message posted by the page. A body that is not JSON is passed
    /// as a JSON string. Unknown names are ignored.
    ///
    /// Handlers may call back into the bridge, including [`WebBridge::detach`].
    pub fn receive(&self, name: &str, body: &str) {
        let body = serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));
        let current = thread::current().id();
        let nested = self.inbound().delivering == Some(current);
        let _delivery = if nested {
            None
        } else {
            Some(self.delivery.lock().unwrap_or_else(PoisonError::into_inner))
        };

        let handler = {
            let mut inbound = self.inbound();
            let Some(handlers) = inbound.handlers.as_ref() else {
                log::debug!("ignoring web message `{name}` after detach");
                return;
            };
            let Some(handler) = handlers.get(name).cloned() else {
                log::debug!("ignoring web message `{name}` without handler");
                return;
            };
            if !nested {
                inbound.delivering = Some(current);
            }
            handler
        };

        let _delivering = if nested {
            None
        } else {
            Some(Delivering { bridge: self })
        };
        handler.handle(&body);
    }

    /// Unregisters every handler. Safe to call repeatedly, and from inside a
    /// handler.
    pub fn detach(&self) {
        let (handlers, from_handler) = {
            let mut inbound = self.inbound();
            let from_handler = inbound.delivering == Some(thread::current().id());
            (inbound.handlers.take(), from_handler)
        };
        let Some(handlers) = handlers else {
            return;
        };
        let names: Vec<String> = handlers.into_keys().collect();

        if from_handler {
            self.inbound().retired.extend(names);
            log::debug!("web bridge detached from a message handler");
            return;
        }
        drop(self.delivery.lock().unwrap_or_else(PoisonError::into_inner));
        self.unregister(&names);
        log::debug!("web bridge detached");
    }

    /// Dispatches `name` with `payload` as its `detail`.
    pub async fn send<T: Serialize + ?Sized>(&self, name: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(payload) => self.dispatch(WebEvent::new(name, payload)).await,
            Err(err) => self.report(BridgeError::Serialization(err.to_string())),
        }
    }

    /// Dispatches `name` without a payload.
    pub async fn send_signal(&self, name: &str) {
        self.dispatch(WebEvent::signal(name)).await;
    }

    /// Forwards an app lifecycle transition.
    pub async fn send_lifecycle(&self, event: LifecycleEvent) {
        self.send_signal(event.event_name()).await;
    }

    /// Evaluates the script for `event`. Failures go to the error callback.
    /// Nothing is sent once the bridge is detached.
    pub async fn dispatch(&self, event: WebEvent) {
        if !self.is_attached() {
            log::debug!("dropping web event `{}` after detach", event.name);
            return;
        }
        let result = match event.script() {
            Ok(script) => self.host.evaluate_script(script).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            self.report(err);
        }
    }

    fn inbound(&self) -> MutexGuard<'_, Inbound> {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unregister(&self, names: &[String]) {
        for name in names {
            self.host.remove_message_handler(name);
        }
    }

    fn report(&self, error: BridgeError) {
        log::warn!("web bridge error: {error}");
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }
}

impl Drop for WebBridge {
    fn drop(&mut self) {
        self.detach();
    }
}
