use typesecure_protocol::ProtocolError;

/// Errors that can occur while classifying a scan.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The uploaded file exceeds the configured size limit.
    /// Raised before any request is made.
    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The service answered with a non-success status.
    #[error("detection service rejected request ({status}): {body}")]
    Rejected {
        status: u16,
        /// Plain-text error body sent by the service.
        body: String,
    },

    /// The service couldn't be reached, or didn't answer in time.
    #[error("detection service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with something that isn't a valid result.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors from a [`RecordStore`](crate::RecordStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store can't be reached.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}
