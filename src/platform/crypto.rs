//! Native random and digest primitives

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::platform::{DigestSource, RandomSource};

/// Random bytes from the thread-local OS-seeded generator
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        use rand::RngCore as _;
        rand::rng().fill_bytes(dest);
    }
}

/// SHA-256 computed in process with `sha2`
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

#[async_trait::async_trait]
impl DigestSource for Sha256Digest {
    async fn sha256(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(Sha256::digest(data).to_vec())
    }
}
