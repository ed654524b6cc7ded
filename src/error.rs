use crate::MetadataKind;

/// Why a [crate::LibraryItem] couldn't produce a value.
///
/// A missing value is not an error; accessors return `Ok(None)` for that.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("item is no longer accessible")]
    Inaccessible,
    #[error("i/o error reading item: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("capacity for {kind} must be greater than zero")]
    ZeroCapacity { kind: MetadataKind },
    #[error("default artwork size must be non-zero, got {width}x{height}")]
    ZeroDefaultSize { width: u32, height: u32 },
}
