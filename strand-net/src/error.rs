use thiserror::Error;

use crate::Encoding;

pub type Result<T> = core::result::Result<T, Error>;

/// Enumeration of errors that may occur when running workers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("core error: {0}")]
    CoreError(#[from] strand_core::Error),

    #[error("bincode error: {0}")]
    BincodeError(#[from] bincode::Error),

    #[cfg(feature = "msgpack_encoding")]
    #[error("rmp_serde decode error: {0}")]
    RmpsDecodeError(#[from] rmp_serde::decode::Error),
    #[cfg(feature = "msgpack_encoding")]
    #[error("rmp_serde encode error: {0}")]
    RmpsEncodeError(#[from] rmp_serde::encode::Error),

    #[cfg(feature = "json_encoding")]
    #[error("serde_json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("encoding unavailable: {0} (is the matching crate feature enabled?)")]
    EncodingUnavailable(Encoding),

    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),
    #[error("invalid launch config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("other: {0}")]
    Other(String),
}

impl From<Error> for strand_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::CoreError(e) => e,
            Error::BincodeError(e) => strand_core::Error::BincodeError(e),
            e => strand_core::Error::Other(e.to_string()),
        }
    }
}
