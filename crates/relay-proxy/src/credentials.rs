//! Identity chain creation with a bounded retry.

use std::future::Future;

use relay_proto::Chain;

use crate::error::CredentialError;

/// Attempts made before giving up on chain creation.
pub const CHAIN_ATTEMPTS: usize = 3;

/// Produces the signed identity chain presented to the server.
pub trait ChainSource: Send + Sync {
    fn create_chain(&self) -> impl Future<Output = Result<Chain, CredentialError>> + Send;
}

/// A fixed chain, for offline servers and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticChain(pub Chain);

impl ChainSource for StaticChain {
    async fn create_chain(&self) -> Result<Chain, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Call `source` up to [`CHAIN_ATTEMPTS`] times. Returns the last error if
/// every attempt fails.
pub async fn create_chain_with_retry<S: ChainSource>(source: &S) -> Result<Chain, CredentialError> {
    let mut attempt = 1;
    loop {
        match source.create_chain().await {
            Ok(chain) => return Ok(chain),
            Err(e) if attempt < CHAIN_ATTEMPTS => {
                tracing::warn!("creating chain failed (attempt {attempt}/{CHAIN_ATTEMPTS}): {e}");
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!("creating chain failed (attempt {attempt}/{CHAIN_ATTEMPTS}): {e}");
                return Err(e);
            }
        }
    }
}
