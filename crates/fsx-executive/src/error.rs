//! Executive error types

use fsx_cds::CdsError;
use fsx_pool::PoolError;
use fsx_resource::{ResourceId, SlotError};

use crate::config::ConfigError;

/// Errors returned by [`Executive`](crate::Executive) services.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EsError {
    /// Argument rejected before any state was touched
    #[error("bad argument: {0}")]
    BadArgument(&'static str),

    /// Name is empty or too long for its kind
    #[error("invalid name {0:?}")]
    InvalidName(String),

    /// Another resource of the same kind already uses the name
    #[error("duplicate name {0:?}")]
    DuplicateName(String),

    #[error("name {0:?} not found")]
    NameNotFound(String),

    /// Handle of the wrong kind, stale, or never issued
    #[error("resource id {0} is not valid")]
    InvalidId(ResourceId),

    /// Slot table full
    #[error(transparent)]
    Slot(#[from] SlotError),

    /// Memory pool failure
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Critical Data Store failure
    #[error(transparent)]
    Cds(#[from] CdsError),

    /// No usable Critical Data Store on this boot
    #[error("critical data store is not available")]
    CdsUnavailable,

    /// System log full in discard mode
    #[error("system log full")]
    SysLogFull,

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Export serialization failed
    #[error("encode failed: {0}")]
    Encode(String),
}

impl EsError {
    /// Treat any slot lookup failure on `id` as an invalid handle.
    pub(crate) fn invalid(id: impl Into<ResourceId>) -> impl FnOnce(SlotError) -> EsError {
        let id = id.into();
        move |_| EsError::InvalidId(id)
    }
}
