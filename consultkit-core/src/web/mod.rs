//! Authenticated web views.
//!
//! [`WebSurface`] builds the URLs of the hosted pages with the session handoff
//! parameters; [`WebBridge`] carries events between native code and the page
//! once it is loaded.

mod bridge;
mod surface;

pub use bridge::{
    BridgeError, LifecycleEvent, MessageHandler, WebBridge, WebBridgeBuilder, WebContentHost,
    WebEvent, CONTENT_LOADED,
};
pub use surface::{DeviceInfo, WebSurface};
