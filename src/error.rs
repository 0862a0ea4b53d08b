/// The full error taxonomy of the exchange engine. Every precondition
/// failure maps to exactly one variant; only [`ExchangeError::TransientStore`]
/// is safe to retry.
#[derive(thiserror::Error, Debug)]
pub enum ExchangeError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("video {video} is currently owned by {holder}, expected {expected}")]
    OwnershipConflict {
        video: String,
        expected: String,
        holder: String,
    },

    #[error("exchange {exchange} is {status}, the requested action needs a pending exchange")]
    InvalidTransition { exchange: String, status: String },

    #[error("a pending exchange for video {video} between these accounts already exists")]
    DuplicateProposal { video: String },

    #[error("not eligible to rate: {0}")]
    NotEligible(String),

    #[error("store failure: {0}")]
    TransientStore(String),
}

impl ExchangeError {
    /// Infrastructure failures may be retried by the caller. Domain errors
    /// never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::TransientStore(_))
    }
}

impl From<sled::Error> for ExchangeError {
    fn from(err: sled::Error) -> Self {
        ExchangeError::TransientStore(err.to_string())
    }
}

impl From<minicbor::decode::Error> for ExchangeError {
    fn from(err: minicbor::decode::Error) -> Self {
        ExchangeError::TransientStore(format!("cbor decode: {err}"))
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for ExchangeError {
    fn from(err: minicbor::encode::Error<E>) -> Self {
        ExchangeError::TransientStore(format!("cbor encode: {err}"))
    }
}
