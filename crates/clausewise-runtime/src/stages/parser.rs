//! Parser stage: extraction plus contract validation.

use async_trait::async_trait;
use std::sync::Arc;

use clausewise_core::{
    refine_kind, sniff_kind, AnalysisState, DocumentKind, ErrorKind, StageId, TextQuality,
    ToolCallRecord, ToolOutcome,
};

use super::{invoke_agent, Stage, StageError, StageOutput};
use crate::agents::{ParserAgent, ValidationRequest};
use crate::reader::{DocumentReader, ReaderError, ToolRegistry};

async fn validate(
    validator: &ParserAgent,
    text: &str,
    kind: DocumentKind,
) -> Result<(), StageError> {
    let verdict = invoke_agent(
        validator,
        &ValidationRequest {
            text: text.to_string(),
            document_kind: kind,
        },
    )
    .await?;

    if !verdict.is_contract {
        return Err(StageError::new(
            ErrorKind::ValidationFailed,
            format!("document is not a contract: {}", verdict.reasoning),
        ));
    }
    tracing::debug!(
        contract_type = verdict.contract_type.as_deref().unwrap_or("unknown"),
        "Document validated as contract"
    );
    Ok(())
}

/// Fixed-order Parser: one read through the document reader.
pub struct ParserStage {
    reader: Arc<dyn DocumentReader>,
    validator: Arc<ParserAgent>,
}

impl ParserStage {
    pub fn new(reader: Arc<dyn DocumentReader>, validator: Arc<ParserAgent>) -> Self {
        Self { reader, validator }
    }
}

#[async_trait]
impl Stage for ParserStage {
    fn id(&self) -> StageId {
        StageId::Parser
    }

    async fn run(&self, state: &AnalysisState) -> Result<StageOutput, StageError> {
        let bytes = state.source_bytes();
        let hint = state.format_hint();
        let kind = state
            .document_kind()
            .unwrap_or_else(|| sniff_kind(bytes, hint));

        let text = self.reader.read(bytes, hint).await?;
        if text.trim().is_empty() {
            return Err(ReaderError::ExtractionFailed("reader returned no text".into()).into());
        }

        validate(self.validator.as_ref(), &text, kind).await?;
        Ok(StageOutput::Parsed {
            text,
            kind,
            attempt: None,
        })
    }
}

/// Adaptive Parser: one tool attempt per dispatch.
///
/// The tool is chosen from the document kind and the attempts already in
/// the state's tool-call log; the router decides whether to dispatch again.
pub struct AdaptiveParserStage {
    tools: Arc<ToolRegistry>,
    validator: Arc<ParserAgent>,
}

impl AdaptiveParserStage {
    pub fn new(tools: Arc<ToolRegistry>, validator: Arc<ParserAgent>) -> Self {
        Self { tools, validator }
    }
}

#[async_trait]
impl Stage for AdaptiveParserStage {
    fn id(&self) -> StageId {
        StageId::Parser
    }

    async fn run(&self, state: &AnalysisState) -> Result<StageOutput, StageError> {
        let bytes = state.source_bytes();
        let hint = state.format_hint();
        let kind = sniff_kind(bytes, hint);
        let log = state.tool_call_log();

        let Some(choice) = self.tools.select(kind, log) else {
            let all_unsupported = log
                .iter()
                .all(|r| matches!(r.outcome, ToolOutcome::Unsupported { .. }));
            return Err(if all_unsupported {
                StageError::new(
                    ErrorKind::UnsupportedFormat,
                    format!("no extraction tool handles {} documents", kind),
                )
            } else {
                StageError::new(
                    ErrorKind::ExtractionExhausted,
                    format!("every tool for {} documents has been ruled out", kind),
                )
            });
        };

        tracing::info!(
            tool = %choice.tool,
            attempt = state.tool_attempts() + 1,
            retry = choice.retry_count,
            kind = %kind,
            "Trying extraction tool"
        );

        let outcome = match self
            .tools
            .run(&choice.tool, bytes, hint, choice.retry_count)
            .await
        {
            Ok(text) => match self.tools.evaluate(&choice.tool, &text) {
                TextQuality::Satisfactory => {
                    let kind = refine_kind(kind, &choice.tool);
                    validate(self.validator.as_ref(), &text, kind).await?;
                    return Ok(StageOutput::Parsed {
                        text,
                        kind,
                        attempt: Some(ToolCallRecord::new(
                            choice.tool,
                            ToolOutcome::Success,
                            choice.retry_count,
                        )),
                    });
                }
                TextQuality::LowConfidence(reason) => ToolOutcome::LowConfidence { reason },
            },
            Err(ReaderError::UnsupportedFormat(message)) => ToolOutcome::Unsupported { message },
            Err(err) => ToolOutcome::Failed {
                message: err.to_string(),
            },
        };

        tracing::warn!(tool = %choice.tool, outcome = %outcome, "Extraction attempt unusable");
        Ok(StageOutput::ToolAttempt(ToolCallRecord::new(
            choice.tool,
            outcome,
            choice.retry_count,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::HeuristicParser;
    use crate::reader::ExtractionTool;
    use clausewise_core::QualityThresholds;
    use std::time::Duration;

    const CONTRACT: &str = "SERVICES AGREEMENT\n\nThis Agreement is entered into between Acme Corp and Beta LLC. The parties agree that the Services shall be provided under the terms below.\n\n1. Termination. Either party may terminate on 30 days notice.\n";

    struct Canned(&'static str, Result<&'static str, ReaderError>);

    #[async_trait]
    impl ExtractionTool for Canned {
        fn name(&self) -> &str {
            self.0
        }

        async fn extract(&self, _: &[u8], _: Option<&str>, _: u32) -> Result<String, ReaderError> {
            self.1.clone().map(str::to_string)
        }
    }

    #[async_trait]
    impl DocumentReader for Canned {
        async fn read(&self, _: &[u8], _: Option<&str>) -> Result<String, ReaderError> {
            self.1.clone().map(str::to_string)
        }
    }

    fn in_progress(bytes: &[u8], hint: Option<&str>) -> AnalysisState {
        let mut state = AnalysisState::new(bytes.to_vec(), hint.map(str::to_string));
        state.begin().unwrap();
        state
    }

    fn registry(tools: Vec<Canned>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new(QualityThresholds::default(), Duration::from_secs(5));
        for tool in tools {
            registry = registry.register(Arc::new(tool));
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_fixed_parser_sets_kind() {
        let stage = ParserStage::new(
            Arc::new(Canned("reader", Ok(CONTRACT))),
            Arc::new(HeuristicParser),
        );
        let state = in_progress(b"%PDF-1.4 BT (x) Tj ET", Some("pdf"));
        match stage.run(&state).await.unwrap() {
            StageOutput::Parsed { kind, attempt, .. } => {
                assert_eq!(kind, DocumentKind::PdfText);
                assert!(attempt.is_none());
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fixed_parser_rejects_non_contract() {
        let stage = ParserStage::new(
            Arc::new(Canned("reader", Ok("Shopping list: eggs, milk, bread."))),
            Arc::new(HeuristicParser),
        );
        let err = stage.run(&in_progress(b"x", None)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_fixed_parser_maps_reader_failure() {
        let stage = ParserStage::new(
            Arc::new(Canned("reader", Err(ReaderError::ExtractionFailed("corrupt".into())))),
            Arc::new(HeuristicParser),
        );
        let err = stage.run(&in_progress(b"x", None)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExtractionFailed);
    }

    #[tokio::test]
    async fn test_adaptive_records_low_confidence() {
        let stage = AdaptiveParserStage::new(
            registry(vec![Canned("direct-text", Ok("tiny"))]),
            Arc::new(HeuristicParser),
        );
        match stage.run(&in_progress(b"x", None)).await.unwrap() {
            StageOutput::ToolAttempt(record) => {
                assert_eq!(record.tool, "direct-text");
                assert_eq!(record.retry_count, 0);
                assert!(matches!(record.outcome, ToolOutcome::LowConfidence { .. }));
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_adaptive_moves_to_next_tool() {
        let stage = AdaptiveParserStage::new(
            registry(vec![
                Canned("direct-text", Err(ReaderError::ExtractionFailed("no layer".into()))),
                Canned("ocr", Ok(CONTRACT)),
            ]),
            Arc::new(HeuristicParser),
        );
        let mut state = in_progress(b"%PDF-1.4 BT (x) Tj ET", Some("pdf"));
        state
            .record_tool_call(ToolCallRecord::new(
                "direct-text",
                ToolOutcome::Failed { message: "no layer".into() },
                0,
            ))
            .unwrap();

        match stage.run(&state).await.unwrap() {
            StageOutput::Parsed { kind, attempt, .. } => {
                assert_eq!(kind, DocumentKind::PdfText);
                let attempt = attempt.unwrap();
                assert_eq!(attempt.tool, "ocr");
                assert_eq!(attempt.outcome, ToolOutcome::Success);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scanned_pdf_read_directly_is_refined() {
        let stage = AdaptiveParserStage::new(
            registry(vec![Canned("direct-text", Ok(CONTRACT))]),
            Arc::new(HeuristicParser),
        );
        let state = in_progress(b"%PDF-1.4 image only", None);
        match stage.run(&state).await.unwrap() {
            StageOutput::Parsed { kind, .. } => assert_eq!(kind, DocumentKind::PdfText),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_unsupported_is_unsupported_format() {
        let stage = AdaptiveParserStage::new(
            registry(vec![Canned(
                "direct-text",
                Err(ReaderError::UnsupportedFormat("binary".into())),
            )]),
            Arc::new(HeuristicParser),
        );
        let mut state = in_progress(b"\x00\x01", None);
        state
            .record_tool_call(ToolCallRecord::new(
                "direct-text",
                ToolOutcome::Unsupported { message: "binary".into() },
                0,
            ))
            .unwrap();

        let err = stage.run(&state).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
    }
}
