use crate::error::Error;

/// Result type alias used throughout colbridge.
pub type Result<T> = std::result::Result<T, Error>;
