use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// List of possible formats for encoding messages passed between workers.
///
/// Only the outer message framing follows the selected format. Values and
/// closures carried inside are always stored as registry key and bincode
/// bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Fast binary format, always available
    Bincode,
    /// Binary format with implementations in many different languages
    MsgPack,
    /// Very common but more verbose format, useful for debugging
    Json,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Bincode
    }
}

impl FromStr for Encoding {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let e = match s.to_lowercase().as_str() {
            "bincode" | "bin" => Self::Bincode,
            "msgpack" | "messagepack" | "rmp" => Self::MsgPack,
            "json" => Self::Json,
            _ => {
                return Err(Error::Other(format!(
                    "failed parsing encoding from string: {}",
                    s
                )))
            }
        };
        Ok(e)
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bincode => write!(f, "bincode"),
            Self::MsgPack => write!(f, "msgpack"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl Encoding {
    /// Checks whether support for the encoding was compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Bincode => true,
            Self::MsgPack => cfg!(feature = "msgpack_encoding"),
            Self::Json => cfg!(feature = "json_encoding"),
        }
    }
}

/// Packs serializable object to bytes based on selected encoding.
pub fn pack<S: Serialize>(obj: &S, encoding: &Encoding) -> Result<Vec<u8>> {
    let packed: Vec<u8> = match encoding {
        Encoding::Bincode => bincode::serialize(obj)?,
        Encoding::MsgPack => {
            #[cfg(not(feature = "msgpack_encoding"))]
            return Err(Error::EncodingUnavailable(*encoding));
            #[cfg(feature = "msgpack_encoding")]
            {
                let mut buf = Vec::new();
                obj.serialize(&mut rmp_serde::Serializer::new(&mut buf))?;
                buf
            }
        }
        Encoding::Json => {
            #[cfg(not(feature = "json_encoding"))]
            return Err(Error::EncodingUnavailable(*encoding));
            #[cfg(feature = "json_encoding")]
            {
                serde_json::to_vec(obj)?
            }
        }
    };
    Ok(packed)
}

/// Unpacks object from bytes based on selected encoding.
pub fn unpack<P: DeserializeOwned>(bytes: &[u8], encoding: &Encoding) -> Result<P> {
    let unpacked = match encoding {
        Encoding::Bincode => bincode::deserialize(bytes)?,
        Encoding::MsgPack => {
            #[cfg(not(feature = "msgpack_encoding"))]
            return Err(Error::EncodingUnavailable(*encoding));
            #[cfg(feature = "msgpack_encoding")]
            {
                let mut de = rmp_serde::Deserializer::new(bytes).with_binary();
                serde::Deserialize::deserialize(&mut de)?
            }
        }
        Encoding::Json => {
            #[cfg(not(feature = "json_encoding"))]
            return Err(Error::EncodingUnavailable(*encoding));
            #[cfg(feature = "json_encoding")]
            {
                serde_json::from_slice(bytes)?
            }
        }
    };
    Ok(unpacked)
}
