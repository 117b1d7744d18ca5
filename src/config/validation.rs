use super::models::Config;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("repair.max_fix_time must be positive")]
    ZeroMaxFixTime,

    #[error("repair.prefix must be a relative path without leading or trailing '/': {0:?}")]
    InvalidPrefix(String),

    #[error("repair.job_user must not be empty")]
    EmptyJobUser,

    #[error("engine.max_parallel_tasks must be positive")]
    ZeroParallelTasks,

    #[error("No codecs configured")]
    NoCodecs,

    #[error("Duplicate codec id '{0}'")]
    DuplicateCodec(String),

    #[error("Codec '{id}' has invalid geometry: {stripe_length}+{parity_length}")]
    InvalidCodecGeometry {
        id: String,
        stripe_length: u32,
        parity_length: u32,
    },

    #[error("Codec id must not be empty")]
    EmptyCodecId,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_repair(config)?;
    validate_engine(config)?;
    validate_codecs(config)?;
    Ok(())
}

fn validate_repair(config: &Config) -> Result<(), ValidationError> {
    let repair = &config.repair;

    if repair.max_fix_time.as_u64() == 0 {
        return Err(ValidationError::ZeroMaxFixTime);
    }

    let prefix = repair.prefix.trim();
    if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(ValidationError::InvalidPrefix(repair.prefix.clone()));
    }

    if repair.job_user.trim().is_empty() {
        return Err(ValidationError::EmptyJobUser);
    }

    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    if config.engine.max_parallel_tasks == 0 {
        return Err(ValidationError::ZeroParallelTasks);
    }
    Ok(())
}

fn validate_codecs(config: &Config) -> Result<(), ValidationError> {
    if config.codecs.is_empty() {
        return Err(ValidationError::NoCodecs);
    }

    let mut seen = HashSet::new();
    for codec in &config.codecs {
        if codec.id.trim().is_empty() {
            return Err(ValidationError::EmptyCodecId);
        }
        if !seen.insert(codec.id.as_str()) {
            return Err(ValidationError::DuplicateCodec(codec.id.clone()));
        }
        if codec.stripe_length == 0 || codec.parity_length == 0 {
            return Err(ValidationError::InvalidCodecGeometry {
                id: codec.id.clone(),
                stripe_length: codec.stripe_length,
                parity_length: codec.parity_length,
            });
        }
    }

    Ok(())
}
