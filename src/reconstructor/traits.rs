use async_trait::async_trait;
use thiserror::Error;

use crate::codec::Codec;
use crate::conf::JobConf;

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("missing input {0}")]
    MissingInput(String),
    #[error("I/O failure: {0}")]
    Io(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("could not instantiate reconstructor: {0}")]
    Instantiate(String),
}

/// Codec-specific decoder handed to reconstructors
#[derive(Debug, Clone)]
pub struct Decoder {
    codec: Codec,
    conf: JobConf,
}

impl Decoder {
    pub fn new(conf: &JobConf, codec: Codec) -> Self {
        Self {
            codec,
            conf: conf.clone(),
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn conf(&self) -> &JobConf {
        &self.conf
    }

    /// Blocks per stripe, data plus parity
    pub fn stripe_width(&self) -> u32 {
        self.codec.stripe_length + self.codec.parity_length
    }
}

/// Rebuilds lost blocks of one erasure-coded file
///
/// Returning `Ok` means the file is whole again.
#[async_trait]
pub trait Reconstructor: Send + Sync {
    /// Rebuild missing data blocks of `source_path`
    async fn process_file(
        &self,
        source_path: &str,
        parity_path: &str,
        decoder: &Decoder,
    ) -> Result<(), ReconstructError>;

    /// Rebuild missing blocks of `parity_path`
    async fn process_parity_file(
        &self,
        source_path: &str,
        parity_path: &str,
        decoder: &Decoder,
    ) -> Result<(), ReconstructError>;
}
