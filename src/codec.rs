//! Erasure-coding codec descriptors
//!
//! Only the descriptors live here; the coding math belongs to the decoder
//! implementation behind each reconstructor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::conf::{JobConf, keys};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown codec: {0}")]
    Unknown(String),

    #[error("invalid codec list in {key}: {source}")]
    InvalidJson {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate codec id: {0}")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    pub id: String,
    /// Data blocks per stripe
    pub stripe_length: u32,
    /// Parity blocks per stripe
    pub parity_length: u32,
    /// Higher wins when several codecs cover the same file
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: String,
}

impl Codec {
    pub fn new(id: impl Into<String>, stripe_length: u32, parity_length: u32) -> Self {
        Self {
            id: id.into(),
            stripe_length,
            parity_length,
            priority: 0,
            description: String::new(),
        }
    }
}

/// Built-in codecs used when the configuration names none
pub fn default_codecs() -> Vec<Codec> {
    vec![
        Codec {
            priority: 100,
            description: "Reed-Solomon 10+4".to_string(),
            ..Codec::new("rs", 10, 4)
        },
        Codec {
            priority: 50,
            description: "XOR 10+1".to_string(),
            ..Codec::new("xor", 10, 1)
        },
    ]
}

#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Codec>,
}

impl CodecRegistry {
    pub fn new(codecs: Vec<Codec>) -> Result<Self, CodecError> {
        let mut map = BTreeMap::new();
        for codec in codecs {
            if map.contains_key(&codec.id) {
                return Err(CodecError::Duplicate(codec.id));
            }
            map.insert(codec.id.clone(), codec);
        }
        Ok(Self { codecs: map })
    }

    /// Initialise from the codec list carried in job configuration
    pub fn from_conf(conf: &JobConf) -> Result<Self, CodecError> {
        match conf.get(keys::CODECS_JSON) {
            None => Self::new(default_codecs()),
            Some(raw) => {
                let codecs: Vec<Codec> =
                    serde_json::from_str(raw).map_err(|source| CodecError::InvalidJson {
                        key: keys::CODECS_JSON,
                        source,
                    })?;
                Self::new(codecs)
            }
        }
    }

    /// Serialise a codec list for [`keys::CODECS_JSON`]
    pub fn to_conf_value(codecs: &[Codec]) -> String {
        serde_json::to_string(codecs).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn get(&self, id: &str) -> Result<&Codec, CodecError> {
        self.codecs
            .get(id)
            .ok_or_else(|| CodecError::Unknown(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.codecs.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}
