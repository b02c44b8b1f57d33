//! Error types for effect table loading and effect playback.

use thiserror::Error;

use crate::data::EffectId;

/// Why a playback request was rejected.
///
/// All of these are recoverable: the scheduler is left untouched and the
/// caller may retry (typically once the loader has resolved the resource).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    /// The id has no row in the effect table.
    #[error("no effect row for {0}")]
    ConfigNotFound(EffectId),
    /// The row's duration is zero or negative.
    #[error("effect {id} has non-positive duration {duration}")]
    InvalidDuration { id: EffectId, duration: f32 },
    /// The resource is still queued or loading.
    #[error("resource for {0} is not resolved yet")]
    ResourceNotReady(EffectId),
    /// The resource failed to resolve after exhausting its retries.
    #[error("resource for {0} failed to load")]
    ResourceLoadFailed(EffectId),
    /// The resolved resource could not produce a dynamic instance.
    #[error("could not create a dynamic instance for {0}")]
    ActivationFailed(EffectId),
}

/// Errors raised while reading an effect table.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TableError {
    #[error("could not read effect table: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse effect table: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("effect table contains {0} more than once")]
    DuplicateId(EffectId),
}
