//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the one operation the cache needs from an
//! image library: transcode a source into a derivative. The production
//! implementation is [`RustBackend`](super::rust_backend::RustBackend).

use super::params::TranscodeParams;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Displayed image dimensions (after orientation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Implementations must be `Send + Sync` so one instance can be shared by
/// every blocking transcode task.
pub trait ImageBackend: Send + Sync {
    /// Decode, orient, resize and encode `source` into `output`.
    ///
    /// Returns the dimensions of the written derivative.
    fn transcode(
        &self,
        source: &[u8],
        params: &TranscodeParams,
        output: &mut dyn Write,
    ) -> Result<Dimensions, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::OutputFormat;
    use std::sync::Mutex;

    /// Mock backend that records transcodes and writes a marker payload.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail_with: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Transcode {
            source_len: usize,
            max_width: u32,
            output: OutputFormat,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(message: &str) -> Self {
            Self {
                operations: Mutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn transcode(
            &self,
            source: &[u8],
            params: &TranscodeParams,
            output: &mut dyn Write,
        ) -> Result<Dimensions, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Transcode {
                source_len: source.len(),
                max_width: params.max_width,
                output: params.output,
            });
            if let Some(message) = &self.fail_with {
                return Err(BackendError::ProcessingFailed(message.clone()));
            }
            write!(output, "{}:{}", params.output.extension(), params.max_width)?;
            Ok(Dimensions {
                width: params.max_width,
                height: params.max_width,
            })
        }
    }

    #[test]
    fn mock_records_transcode() {
        let backend = MockBackend::new();
        let mut out = Vec::new();
        let params = TranscodeParams {
            max_width: 300,
            source_format: None,
            output: OutputFormat::Png,
        };

        backend.transcode(b"abc", &params, &mut out).unwrap();

        assert_eq!(out, b"png:300");
        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::Transcode {
                source_len: 3,
                max_width: 300,
                output: OutputFormat::Png,
            }]
        );
    }

    #[test]
    fn failing_mock_reports_error() {
        let backend = MockBackend::failing("corrupt");
        let params = TranscodeParams {
            max_width: 300,
            source_format: None,
            output: OutputFormat::Png,
        };
        let result = backend.transcode(b"abc", &params, &mut Vec::new());
        assert!(matches!(result, Err(BackendError::ProcessingFailed(m)) if m == "corrupt"));
    }
}
