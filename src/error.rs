use thiserror::Error;

/// Fallible outcomes: allocation failure and malformed serialized input.
/// Logic violations (a caller breaking an internal invariant) aren't
/// represented here — they trip a `debug_assert!` instead.
#[derive(Debug, Error)]
pub enum DivaError {
    #[error("allocation failed while resizing an infix store")]
    OutOfMemory,

    #[error("serialized buffer truncated: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("bad magic number in serialized buffer: {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported serialized format version: {0}")]
    BadVersion(u16),

    #[error("key shorter than the region already pinned by existing boundaries")]
    KeyTooShort,
}

pub type Result<T> = std::result::Result<T, DivaError>;
