use async_trait::async_trait;
use tracing::info;

use super::traits::{Decoder, ReconstructError, Reconstructor};
use crate::storage::{StorageClient, StoragePath};

/// Built-in strategy that checks the surviving counterpart of a damaged file
/// is readable: parity when data blocks are lost, source when parity is lost.
///
/// Deployments with a real block decoder register it under its own name and
/// point `repair.reconstructor` at it.
pub struct PresenceCheckReconstructor {
    storage: StorageClient,
}

impl PresenceCheckReconstructor {
    pub const NAME: &'static str = "blockfix::reconstructor::PresenceCheckReconstructor";

    pub fn new(storage: StorageClient) -> Self {
        Self { storage }
    }

    async fn require(&self, path: &str) -> Result<(), ReconstructError> {
        let exists = self
            .storage
            .exists(&StoragePath::from(path))
            .await
            .map_err(|e| ReconstructError::Io(e.to_string()))?;

        if exists {
            Ok(())
        } else {
            Err(ReconstructError::MissingInput(path.to_string()))
        }
    }
}

#[async_trait]
impl Reconstructor for PresenceCheckReconstructor {
    async fn process_file(
        &self,
        source_path: &str,
        parity_path: &str,
        decoder: &Decoder,
    ) -> Result<(), ReconstructError> {
        self.require(parity_path).await?;
        info!(
            source_path,
            parity_path,
            codec = %decoder.codec().id,
            "Parity available for source reconstruction"
        );
        Ok(())
    }

    async fn process_parity_file(
        &self,
        source_path: &str,
        parity_path: &str,
        decoder: &Decoder,
    ) -> Result<(), ReconstructError> {
        self.require(source_path).await?;
        info!(
            source_path,
            parity_path,
            codec = %decoder.codec().id,
            "Source available for parity reconstruction"
        );
        Ok(())
    }
}
