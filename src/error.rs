use thiserror::Error;

/// Failure to read one of the host metrics that make up a [`Sample`].
///
/// Temperature is deliberately not represented here: an unreadable sensor is
/// substituted with `0.0` by the sampler and never surfaces as an error.
///
/// [`Sample`]: crate::metrics::Sample
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("{0} metrics unavailable")]
    Unavailable(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage session pool closed")]
    Pool(#[from] tokio::sync::AcquireError),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("chart drawing failed: {0}")]
    Draw(String),
    #[error("png encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
