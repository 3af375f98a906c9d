//! Error types.

use crate::comm::MessageKind;
use crate::registry::TypeKey;

pub type Result<T> = core::result::Result<T, Error>;

/// Crate-wide error type.
///
/// Only recoverable failures end up here. Broken contracts, like reading
/// a value as the wrong type or fulfilling an ivar twice, panic instead.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(
        "no registry entry for type key: {0:#018x} (is the type registered, \
        and are all workers running the same binary?)"
    )]
    UnknownTypeKey(TypeKey),
    #[error("registry entry for type key {0:#018x} is not a {1} entry")]
    WrongEntryKind(TypeKey, &'static str),

    #[error("bincode error: {0}")]
    BincodeError(#[from] bincode::Error),

    #[error("no handler registered for message kind: {0:?}")]
    NoHandler(MessageKind),
    #[error("transport disconnected: {0}")]
    Disconnected(String),

    #[error("other error: {0}")]
    Other(String),
}
