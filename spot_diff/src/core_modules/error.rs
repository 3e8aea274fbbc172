// THEORY:
// Every stage of the engine fails in one of a handful of well-understood ways, and
// a calling layer needs to tell them apart without parsing messages. `DiffError`
// is the single error type that flows out of every public operation; `ErrorKind`
// is its flat discriminant for callers that only need to route (e.g. to an HTTP
// status code). All failures are deterministic given the same input, so nothing
// here is retried.

use std::path::PathBuf;

/// Coarse classification of a `DiffError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Decode,
    Shape,
    DimensionMismatch,
    Validation,
    Io,
    Encode,
    WorkerUnavailable,
}

/// The error type returned by every fallible engine operation.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The input bytes are not a supported, well-formed image.
    #[error("could not decode image: {0}")]
    Decode(String),

    /// The composite image cannot be split into two non-empty halves.
    #[error("image of height {height} is too small to split into two halves")]
    Shape { height: u32 },

    /// The two comparison images do not share a shape.
    #[error(
        "comparison images differ in shape: {}x{}x{} vs {}x{}x{}",
        top.0, top.1, top.2, bottom.0, bottom.1, bottom.2
    )]
    DimensionMismatch {
        /// (width, height, channels) of the first image.
        top: (u32, u32, u8),
        /// (width, height, channels) of the second image.
        bottom: (u32, u32, u8),
    },

    /// A detection parameter is outside its accepted range.
    #[error("invalid parameter: {0}")]
    Validation(String),

    /// Writing a rendered image in save mode failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rendered image could not be encoded.
    #[error("could not encode image: {0}")]
    Encode(String),

    /// The worker pool has shut down or dropped a request.
    #[error("detection worker unavailable: {0}")]
    WorkerUnavailable(&'static str),
}

impl DiffError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiffError::Decode(_) => ErrorKind::Decode,
            DiffError::Shape { .. } => ErrorKind::Shape,
            DiffError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            DiffError::Validation(_) => ErrorKind::Validation,
            DiffError::Io { .. } => ErrorKind::Io,
            DiffError::Encode(_) => ErrorKind::Encode,
            DiffError::WorkerUnavailable(_) => ErrorKind::WorkerUnavailable,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiffError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiffError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(DiffError::Decode("x".into()).kind(), ErrorKind::Decode);
        assert_eq!(DiffError::Shape { height: 1 }.kind(), ErrorKind::Shape);
        assert_eq!(
            DiffError::Validation("min_area".into()).kind(),
            ErrorKind::Validation
        );
        let io = DiffError::io("/tmp/x.png", std::io::Error::other("disk full"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn mismatch_message_names_both_shapes() {
        let err = DiffError::DimensionMismatch {
            top: (10, 20, 3),
            bottom: (10, 21, 3),
        };
        let message = err.to_string();
        assert!(message.contains("10x20x3"));
        assert!(message.contains("10x21x3"));
    }
}
