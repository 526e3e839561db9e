#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sumtree(#[from] sumtree::Error),

    #[error("invalid snapshot entry {}: {}", .index, .reason)]
    InvalidSnapshot { index: usize, reason: String },

    #[error("{} invariant violations", .0)]
    InvariantsViolated(usize),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
