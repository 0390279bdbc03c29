//! The live session: tokens, the practitioner profile and refresh.

mod clock;
mod manager;
mod oauth;
mod profile;
mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{SessionManager, SessionObserver, SessionStatus, TokenRefresher};
pub use oauth::OAuthClient;
pub use profile::Profile;
pub use token::Token;

pub(crate) use token::TokenResponse;

#[cfg(test)]
pub(crate) use token::test_token;
