use ringlog_fd::TokenError;

use crate::layout::MAX_TAG_LEN;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tag is {0} bytes long, at most {MAX_TAG_LEN} are allowed")]
    TagTooLong(usize),

    #[error("shared log region unavailable: {0}")]
    RegionUnavailable(#[source] std::io::Error),

    #[error("memory is not a log region")]
    InvalidRegion,

    #[error("invalid handle token: {0}")]
    InvalidHandleToken(#[from] TokenError),

    #[error("log region is mapped read-only")]
    ReadOnly,

    #[error("log region was closed")]
    Closed,

    #[error("failed to write to the dump sink: {0}")]
    SinkWriteFailure(#[source] std::io::Error),
}
