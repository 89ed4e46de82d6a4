use std::time::Duration;

use thiserror::Error;

/// Errors raised by the tracing pipeline and its exporters.
///
/// The variants follow where a failure happened rather than what type
/// produced it: a worker that is gone, an exporter that said no, a
/// deadline that ran out, or a layer underneath the pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A pipeline component was used after shutdown, or its worker task
    /// is no longer running.
    #[error("tracing pipeline unavailable: {0}")]
    Unavailable(String),

    /// An exporter rejected a batch.
    #[error("span export failed: {0}")]
    Export(String),

    /// A batch export ran past its deadline and was abandoned.
    #[error("span export exceeded its {0:?} deadline")]
    Deadline(Duration),

    /// Failure in a layer the pipeline sits on, such as the outbound
    /// transport or a payload encoder.
    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl TraceError {
    /// Wrap an error from a layer underneath the pipeline.
    pub fn from_source(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        TraceError::Source(Box::new(err))
    }
}

/// A specialized result for tracing operations.
pub type TraceResult<T> = Result<T, TraceError>;
