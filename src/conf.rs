//! Job configuration passed between the repair manager and the compute engine.
//!
//! A [`JobConf`] is a flat, ordered string map. The manager builds one base
//! configuration from the application config and layers per-repair entries on
//! a copy of it for every submitted job, so the key names in [`keys`] are the
//! contract between submitter and task.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Well-known configuration keys
pub mod keys {
    /// Wall-time budget for a single repair, in milliseconds
    pub const MAX_FIX_TIME_FOR_FILE: &str =
        "io.hops.erasure_coding.blockfix.max.fix.time.for.file";
    pub const REPAIR_TYPE: &str = "repair_type";
    pub const SOURCE_PATH: &str = "source_path";
    pub const PARITY_PATH: &str = "parity_path";
    pub const CODEC_ID: &str = "codec_id";
    /// Registered name of the reconstructor strategy a task instantiates
    pub const RECONSTRUCTOR_CLASS: &str = "hdfs.blockintegrity.reconstructor";
    /// JSON array of codec descriptors
    pub const CODECS_JSON: &str = "erasure_coding.codecs.json";
    pub const JOB_USER: &str = "mapreduce.job.user.name";
}

/// 4 hours
pub const DEFAULT_MAX_FIX_TIME_FOR_FILE: u64 = 4 * 60 * 60 * 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfError {
    #[error("missing configuration key: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConf {
    entries: BTreeMap<String, String>,
}

impl JobConf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of `base` that can be modified without touching the original
    pub fn layered(base: &JobConf) -> Self {
        base.clone()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Value for `key`, failing when it is absent or empty
    pub fn require(&self, key: &str) -> Result<&str, ConfError> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfError::Missing(key.to_string())),
        }
    }

    /// Parse the value for `key`, falling back to `default` when absent
    pub fn get_parsed_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfError::Invalid {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, ConfError> {
        self.get_parsed_or(key, default)
    }

    /// Parse a required value
    pub fn require_parsed<T: FromStr>(&self, key: &str) -> Result<T, ConfError> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| ConfError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
