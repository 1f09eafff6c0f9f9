//! Chunk stores
//!
//! The writer only needs a single primitive, [`ChunkStore::put_one`]. Stores
//! own their own locking; the writer never reads back from them.

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::chunk::Chunk;
use chrono::{DateTime, Utc};

/// Default tenant for single-tenant deployments
pub const DEFAULT_TENANT: &str = "fake";

/// Logical context attached to every store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteContext {
    pub tenant: String,
}

impl WriteContext {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
        }
    }
}

impl Default for WriteContext {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT)
    }
}

/// Append-only sink for finished chunks
pub trait ChunkStore: Send + Sync {
    /// Persist one chunk covering `[from, through]`
    fn put_one(
        &self,
        ctx: &WriteContext,
        from: DateTime<Utc>,
        through: DateTime<Utc>,
        chunk: Chunk,
    ) -> Result<(), StoreError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Tenants become path segments and key prefixes
pub fn validate_tenant(tenant: &str) -> Result<(), StoreError> {
    let valid = !tenant.is_empty()
        && tenant != "."
        && tenant != ".."
        && tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTenant(tenant.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tenant '{0}'")]
    InvalidTenant(String),

    #[error("Chunk tenant '{chunk}' does not match context tenant '{context}'")]
    TenantMismatch { context: String, chunk: String },

    #[error("Chunk error: {0}")]
    Chunk(#[from] crate::chunk::ChunkError),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Checks shared by every store
pub(crate) fn check_put(ctx: &WriteContext, chunk: &Chunk) -> Result<(), StoreError> {
    validate_tenant(&ctx.tenant)?;
    if chunk.tenant() != ctx.tenant {
        return Err(StoreError::TenantMismatch {
            context: ctx.tenant.clone(),
            chunk: chunk.tenant().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tenant() {
        assert!(validate_tenant("fake").is_ok());
        assert!(validate_tenant("team-a_1.prod").is_ok());
        for bad in ["", ".", "..", "a/b", "a b", "ünï"] {
            assert!(matches!(validate_tenant(bad), Err(StoreError::InvalidTenant(_))));
        }
    }
}
