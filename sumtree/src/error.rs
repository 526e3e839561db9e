#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed storage key: {}", .0)]
    MalformedKey(String),

    #[error("Malformed encoding at {}: {}", .key, .reason)]
    MalformedEncoding { key: String, reason: String },

    #[error("Invariant violated: {}", .0)]
    InvariantViolation(String),

    #[error("Weight must not be negative: {}", .0)]
    NegativeWeight(num_bigint::BigInt),

    #[error("Invalid weight literal: {:?}", .0)]
    InvalidWeight(String),

    #[error("Invalid config: {}", .0)]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Ipld(#[from] libipld::error::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(key: &[u8], reason: impl ToString) -> Self {
        Self::MalformedEncoding {
            key: crate::keys::display_key(key),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invariant(text: impl Into<String>) -> Self {
        Self::InvariantViolation(text.into())
    }

    /// true for errors that mean the underlying store content is corrupt
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedKey(_) | Self::MalformedEncoding { .. } | Self::InvariantViolation(_)
        )
    }
}
