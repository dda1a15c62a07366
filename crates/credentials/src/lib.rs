pub mod cookie_jar;
pub mod mirror;
pub mod store;

use thiserror::Error;

pub use cookie_jar::{Cookie, CookieJar};
pub use mirror::{load_or_create_master_key, DurableMirror};
pub use store::{
    Clock, SystemClock, TokenLifetimes, TokenRevision, TokenStore, ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error")]
    Encryption,

    #[error("Invalid master key")]
    InvalidKey,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
