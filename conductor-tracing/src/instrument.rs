//! Span helpers for workflow and step execution.
//!
//! The runner calls these at its lifecycle notifications so every run
//! produces the same span shapes and attribute names.

use conductor_api::{KeyValue, SpanContext, SpanKind};

use crate::span::Span;
use crate::tracer::{SpanBuilder, Tracer};

/// Attribute carrying the workflow name.
pub const WORKFLOW_NAME: &str = "workflow.name";
/// Attribute carrying the run id; also denormalized by the span store.
pub const WORKFLOW_RUN_ID: &str = "workflow.run_id";
/// Attribute carrying the step id.
pub const STEP_ID: &str = "step.id";
/// Attribute carrying the step type.
pub const STEP_TYPE: &str = "step.type";
/// Attribute classifying a span (`workflow`, `step`, `llm`).
pub const SPAN_TYPE: &str = "span.type";

/// Start the root span for a workflow run: `workflow.run: <name>`.
pub fn start_workflow_span(tracer: &Tracer, workflow_name: &str, run_id: &str) -> Span {
    tracer.build(
        SpanBuilder::from_name(format!("workflow.run: {workflow_name}"))
            .with_kind(SpanKind::Internal)
            .with_attributes(vec![
                KeyValue::new(WORKFLOW_NAME, workflow_name.to_owned()),
                KeyValue::new(WORKFLOW_RUN_ID, run_id.to_owned()),
                KeyValue::new(SPAN_TYPE, "workflow"),
            ]),
    )
}

/// Start a step span under the workflow root: `step: <id>`.
pub fn start_step_span(
    tracer: &Tracer,
    parent: &SpanContext,
    step_id: &str,
    step_type: &str,
) -> Span {
    tracer.build(
        SpanBuilder::from_name(format!("step: {step_id}"))
            .with_kind(SpanKind::Internal)
            .with_parent(parent.clone())
            .with_attributes(vec![
                KeyValue::new(STEP_ID, step_id.to_owned()),
                KeyValue::new(STEP_TYPE, step_type.to_owned()),
                KeyValue::new(SPAN_TYPE, "step"),
            ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::testing::InMemorySpanExporter;
    use crate::provider::TracerProvider;
    use conductor_api::Value;

    #[tokio::test]
    async fn workflow_and_step_spans_carry_conventional_attributes() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("runner");

        let mut root = start_workflow_span(&tracer, "deploy", "r1");
        let root_context = root.span_context().clone();
        let mut step = start_step_span(&tracer, &root_context, "s1", "llm");
        step.end();
        root.end();
        for result in provider.force_flush().await {
            result.unwrap();
        }

        let spans = exporter.exported();
        assert_eq!(spans.len(), 2);

        let step_span = &spans[0];
        assert_eq!(step_span.name, "step: s1");
        assert_eq!(step_span.parent_span_id, root_context.span_id());
        assert_eq!(step_span.span_context.trace_id(), root_context.trace_id());
        assert!(step_span
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == STEP_ID && kv.value == Value::String("s1".into())));

        let root_span = &spans[1];
        assert_eq!(root_span.name, "workflow.run: deploy");
        assert!(root_span
            .attributes
            .iter()
            .any(|kv| kv.key.as_str() == WORKFLOW_RUN_ID && kv.value == Value::String("r1".into())));
    }
}
