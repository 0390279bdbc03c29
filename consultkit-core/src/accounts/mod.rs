//! Remembered accounts for the "recent accounts" list.

mod record;
mod store;

pub use record::{AccountKey, AccountRecord, AccountUpdate};
pub use store::AccountStore;

/// Blob store path of the encrypted account map.
pub const ACCOUNTS_BLOB_ID: &str = "recent_accounts.bin";
