//! Extraction tools and the registry the Parser picks them from.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use clausewise_core::{
    assess_text, sniff_kind, DocumentKind, QualityThresholds, TextQuality, ToolCallRecord,
    ToolChoice, ToolSelector, TOOL_FORMAT_SPECIFIC, TOOL_OCR,
};

use super::{CommandTool, DirectTextTool, DocumentReader, ReaderError};
use crate::config::RuntimeConfig;

/// One text extraction strategy.
#[async_trait]
pub trait ExtractionTool: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Extract text. `attempt` counts earlier tries of this tool in the
    /// same run; tools may adjust their parameters on retries.
    async fn extract(
        &self,
        bytes: &[u8],
        hint: Option<&str>,
        attempt: u32,
    ) -> Result<String, ReaderError>;
}

struct RegisteredTool {
    tool: Arc<dyn ExtractionTool>,
    thresholds: QualityThresholds,
}

/// Name -> tool + the quality evaluator applied to its output.
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
    thresholds: QualityThresholds,
    timeout: Duration,
    selector: ToolSelector,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new(thresholds: QualityThresholds, timeout: Duration) -> Self {
        Self {
            tools: BTreeMap::new(),
            thresholds,
            timeout,
            selector: ToolSelector::new(),
        }
    }

    /// The built-in tools, as configured.
    pub fn with_defaults(config: &RuntimeConfig) -> Self {
        let timeout = config.tools.timeout;
        let mut registry = Self::new(config.quality, timeout).register(Arc::new(DirectTextTool));

        if let Some(spec) = &config.tools.format_command {
            registry = registry.register(Arc::new(
                CommandTool::new(TOOL_FORMAT_SPECIFIC, spec.clone(), timeout)
                    .accepting(&[DocumentKind::Docx, DocumentKind::Unknown]),
            ));
        }
        if let Some(spec) = &config.tools.ocr_command {
            registry = registry.register(Arc::new(
                CommandTool::new(TOOL_OCR, spec.clone(), timeout).accepting(&[
                    DocumentKind::PdfScanned,
                    DocumentKind::PdfText,
                    DocumentKind::Unknown,
                ]),
            ));
        }
        registry
    }

    /// Add a tool judged by the registry-wide thresholds.
    pub fn register(self, tool: Arc<dyn ExtractionTool>) -> Self {
        let thresholds = self.thresholds;
        self.register_with_thresholds(tool, thresholds)
    }

    /// Add a tool with its own quality thresholds. Replaces any tool of the
    /// same name.
    pub fn register_with_thresholds(
        mut self,
        tool: Arc<dyn ExtractionTool>,
        thresholds: QualityThresholds,
    ) -> Self {
        self.tools
            .insert(tool.name().to_string(), RegisteredTool { tool, thresholds });
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Next tool for this document, given the attempts made so far.
    pub fn select(&self, kind: DocumentKind, log: &[ToolCallRecord]) -> Option<ToolChoice> {
        self.selector.select(kind, log, &self.names())
    }

    /// Run one tool under the registry timeout.
    pub async fn run(
        &self,
        name: &str,
        bytes: &[u8],
        hint: Option<&str>,
        attempt: u32,
    ) -> Result<String, ReaderError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ReaderError::UnsupportedFormat(format!("no tool named '{}'", name)))?;

        match tokio::time::timeout(self.timeout, registered.tool.extract(bytes, hint, attempt)).await
        {
            Ok(result) => result,
            Err(_) => Err(ReaderError::Timeout(self.timeout)),
        }
    }

    /// Judge a tool's output with that tool's thresholds.
    pub fn evaluate(&self, name: &str, text: &str) -> TextQuality {
        let thresholds = self
            .tools
            .get(name)
            .map(|t| t.thresholds)
            .unwrap_or(self.thresholds);
        assess_text(text, &thresholds)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A single attempt with the first preferred tool for the sniffed kind.
#[async_trait]
impl DocumentReader for ToolRegistry {
    async fn read(&self, bytes: &[u8], hint: Option<&str>) -> Result<String, ReaderError> {
        let kind = sniff_kind(bytes, hint);
        let choice = self.select(kind, &[]).ok_or_else(|| {
            ReaderError::UnsupportedFormat(format!("no extraction tool for {} documents", kind))
        })?;
        tracing::debug!(tool = %choice.tool, kind = %kind, "Reading document");
        self.run(&choice.tool, bytes, hint, 0).await
    }
}
