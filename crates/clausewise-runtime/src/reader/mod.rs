//! Document reader: bytes in, plain text out.
//!
//! Three strategies are available as independently callable tools (see
//! [`ToolRegistry`]). The fixed-order pipeline uses the registry as a plain
//! [`DocumentReader`]; the adaptive pipeline drives the tools one attempt
//! at a time.

mod command;
mod direct;
mod tools;

pub use command::CommandTool;
pub use direct::DirectTextTool;
pub use tools::{ExtractionTool, ToolRegistry};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from document reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),
}

/// Converts a document into text.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read(&self, bytes: &[u8], hint: Option<&str>) -> Result<String, ReaderError>;
}
