#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! Authenticated-access core for the consultation apps.
//!
//! The crate is consumed from Swift and Kotlin through `UniFFI`. The entry
//! point for the mobile apps is [`ConsultClient`]; the building blocks
//! ([`vault::CredentialVault`], [`accounts::AccountStore`],
//! [`session::SessionManager`], [`http::RequestPipeline`] and
//! [`web::WebBridge`]) are public so they can be composed and tested directly.

mod environment;
pub use environment::*;

mod error;
pub use error::*;

mod defaults;
pub use defaults::ClientConfig;

mod client;
pub use client::ConsultClient;

pub mod accounts;
pub mod http;
pub mod logger;
pub mod session;
pub mod vault;
pub mod web;

uniffi::setup_scaffolding!("consultkit_core");
