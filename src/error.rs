/// Errors raised by the remote indexing/chat service.
///
/// `Display` is the human-readable message shown to the user: load failures
/// surface it in a notice, chat failures embed it in a bot message.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Connection refused, DNS failure, body read error, etc.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status. `detail` is the
    /// backend-reported reason when one was sent.
    #[error("{detail}")]
    Api { status: u16, detail: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response from service: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn api(status: u16, detail: impl Into<String>) -> Self {
        Self::Api { status, detail: detail.into() }
    }
}
