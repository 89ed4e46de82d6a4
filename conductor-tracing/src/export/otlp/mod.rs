//! OTLP wire exporter.
//!
//! Ships ended spans to an external collector as protobuf-encoded
//! OTLP/HTTP requests through the instrumented transport, which supplies
//! the TLS floor, retries, and redacted per-attempt logging.

pub mod proto;

use std::time::Duration;

use async_trait::async_trait;
use conductor_api::{SpanId, Status, TraceError, Value};
use conductor_http::{TlsOptions, Transport, TransportConfig};
use conductor_store::unix_nanos;
use tracing::debug;

use super::{ExportResult, SpanData, SpanExporter};

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
const TRACES_PATH: &str = "/v1/traces";

/// Errors raised while building an [`OtlpSpanExporter`].
#[derive(thiserror::Error, Debug)]
pub enum OtlpConfigError {
    /// The endpoint URL failed to parse.
    #[error("invalid OTLP endpoint {0:?}")]
    InvalidEndpoint(String),

    /// A plaintext endpoint was given without the insecure opt-in.
    #[error("OTLP endpoint {0:?} is not TLS; set insecure to allow plaintext")]
    PlaintextEndpoint(String),

    /// The underlying transport rejected its configuration.
    #[error(transparent)]
    Transport(#[from] conductor_http::TransportError),
}

/// Builder for [`OtlpSpanExporter`].
#[derive(Debug)]
pub struct OtlpExporterBuilder {
    endpoint: String,
    timeout: Duration,
    headers: Vec<(String, String)>,
    insecure: bool,
    tls: TlsOptions,
}

impl Default for OtlpExporterBuilder {
    fn default() -> Self {
        OtlpExporterBuilder {
            endpoint: "https://localhost:4318".to_owned(),
            timeout: Duration::from_secs(10),
            headers: Vec::new(),
            insecure: false,
            tls: TlsOptions::default(),
        }
    }
}

impl OtlpExporterBuilder {
    /// Set the collector base endpoint; `/v1/traces` is appended.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a custom header sent with every export request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Allow a plaintext (`http://`) endpoint.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Override TLS settings; a floor below 1.2 fails validation.
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Validate the configuration and build the exporter.
    pub fn build(self) -> Result<OtlpSpanExporter, OtlpConfigError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|_| OtlpConfigError::InvalidEndpoint(self.endpoint.clone()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.insecure => {}
            "http" => return Err(OtlpConfigError::PlaintextEndpoint(self.endpoint.clone())),
            _ => return Err(OtlpConfigError::InvalidEndpoint(self.endpoint.clone())),
        }

        let mut config = TransportConfig::new(format!("conductor-otlp/{}", env!("CARGO_PKG_VERSION")));
        config.timeout = self.timeout;
        // Export payloads are idempotent on the collector side.
        config.allow_non_idempotent_retry = true;
        let transport = Transport::with_tls(config, self.tls)?;

        let mut endpoint = url;
        let joined = format!(
            "{}{}",
            endpoint.path().trim_end_matches('/'),
            TRACES_PATH
        );
        endpoint.set_path(&joined);

        Ok(OtlpSpanExporter {
            endpoint: endpoint.to_string(),
            headers: self.headers,
            transport,
        })
    }
}

/// OTLP/HTTP span exporter.
#[derive(Clone, Debug)]
pub struct OtlpSpanExporter {
    endpoint: String,
    headers: Vec<(String, String)>,
    transport: Transport,
}

impl OtlpSpanExporter {
    /// Start building an exporter.
    pub fn builder() -> OtlpExporterBuilder {
        OtlpExporterBuilder::default()
    }

    /// The fully-resolved traces endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpanExporter for OtlpSpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> ExportResult {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let body = prost::Message::encode_to_vec(&into_request(batch));

        let mut request = self
            .transport
            .request(reqwest::Method::POST, &self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        let request = request
            .body(body)
            .build()
            .map_err(|e| TraceError::from_source(e))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| TraceError::from_source(e))?;
        if !response.status().is_success() {
            return Err(TraceError::Export(format!(
                "collector returned status {}",
                response.status()
            )));
        }
        debug!(count, "exported spans over OTLP");
        Ok(())
    }
}

fn into_request(batch: Vec<SpanData>) -> proto::ExportTraceServiceRequest {
    let service_name = batch
        .first()
        .map(|span| span.service_name.to_string())
        .unwrap_or_default();
    let spans = batch.iter().map(to_proto_span).collect();
    proto::ExportTraceServiceRequest {
        resource_spans: vec![proto::ResourceSpans {
            resource: Some(proto::Resource {
                attributes: vec![proto::KeyValue {
                    key: "service.name".to_owned(),
                    value: Some(proto::AnyValue {
                        value: Some(proto::any_value::Value::StringValue(service_name)),
                    }),
                }],
                dropped_attributes_count: 0,
            }),
            scope_spans: vec![proto::ScopeSpans {
                scope: Some(proto::InstrumentationScope {
                    name: "conductor".to_owned(),
                    version: env!("CARGO_PKG_VERSION").to_owned(),
                }),
                spans,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    }
}

fn to_proto_span(span: &SpanData) -> proto::Span {
    proto::Span {
        trace_id: span.span_context.trace_id().to_bytes().to_vec(),
        span_id: span.span_context.span_id().to_bytes().to_vec(),
        trace_state: span
            .span_context
            .trace_state()
            .header()
            .unwrap_or_default()
            .to_owned(),
        parent_span_id: if span.parent_span_id == SpanId::INVALID {
            Vec::new()
        } else {
            span.parent_span_id.to_bytes().to_vec()
        },
        name: span.name.to_string(),
        kind: to_proto_kind(span.span_kind) as i32,
        start_time_unix_nano: unix_nanos(span.start_time) as u64,
        end_time_unix_nano: unix_nanos(span.end_time) as u64,
        attributes: span.attributes.iter().map(to_proto_key_value).collect(),
        dropped_attributes_count: 0,
        events: span
            .events
            .iter()
            .map(|event| proto::span::Event {
                time_unix_nano: unix_nanos(event.timestamp) as u64,
                name: event.name.to_string(),
                attributes: event.attributes.iter().map(to_proto_key_value).collect(),
                dropped_attributes_count: 0,
            })
            .collect(),
        dropped_events_count: 0,
        status: Some(to_proto_status(&span.status)),
    }
}

fn to_proto_kind(kind: conductor_api::SpanKind) -> proto::span::SpanKind {
    match kind {
        conductor_api::SpanKind::Internal => proto::span::SpanKind::Internal,
        conductor_api::SpanKind::Server => proto::span::SpanKind::Server,
        conductor_api::SpanKind::Client => proto::span::SpanKind::Client,
        conductor_api::SpanKind::Producer => proto::span::SpanKind::Producer,
        conductor_api::SpanKind::Consumer => proto::span::SpanKind::Consumer,
    }
}

fn to_proto_status(status: &Status) -> proto::Status {
    let code = match status {
        Status::Unset => proto::status::StatusCode::Unset,
        Status::Ok => proto::status::StatusCode::Ok,
        Status::Error(_) => proto::status::StatusCode::Error,
    };
    proto::Status {
        message: status.message().to_owned(),
        code: code as i32,
    }
}

fn to_proto_key_value(kv: &conductor_api::KeyValue) -> proto::KeyValue {
    proto::KeyValue {
        key: kv.key.as_str().to_owned(),
        value: Some(to_proto_value(&kv.value)),
    }
}

fn to_proto_value(value: &Value) -> proto::AnyValue {
    let value = match value {
        Value::Bool(v) => proto::any_value::Value::BoolValue(*v),
        Value::I64(v) => proto::any_value::Value::IntValue(*v),
        Value::F64(v) => proto::any_value::Value::DoubleValue(*v),
        Value::String(v) => proto::any_value::Value::StringValue(v.clone()),
        Value::Array(items) => proto::any_value::Value::ArrayValue(proto::ArrayValue {
            values: items.iter().map(to_proto_value).collect(),
        }),
    };
    proto::AnyValue { value: Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_api::{KeyValue, SpanContext, SpanKind, TraceFlags, TraceId, TraceState};
    use prost::Message;
    use std::time::SystemTime;

    #[test]
    fn plaintext_endpoint_requires_insecure() {
        let err = OtlpSpanExporter::builder()
            .with_endpoint("http://collector:4318")
            .build()
            .unwrap_err();
        assert!(matches!(err, OtlpConfigError::PlaintextEndpoint(_)));

        let ok = OtlpSpanExporter::builder()
            .with_endpoint("http://collector:4318")
            .with_insecure(true)
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn endpoint_gets_traces_path() {
        let exporter = OtlpSpanExporter::builder()
            .with_endpoint("https://collector:4318")
            .build()
            .unwrap();
        assert_eq!(exporter.endpoint(), "https://collector:4318/v1/traces");
    }

    #[test]
    fn rejects_unknown_schemes() {
        let err = OtlpSpanExporter::builder()
            .with_endpoint("ftp://collector")
            .build()
            .unwrap_err();
        assert!(matches!(err, OtlpConfigError::InvalidEndpoint(_)));
    }

    #[test]
    fn transform_round_trips_through_protobuf() {
        let start = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let span = SpanData {
            span_context: SpanContext::new(
                TraceId::from(0xabcdu128),
                conductor_api::SpanId::from(0x1234u64),
                TraceFlags::default().with_sampled(true),
                false,
                TraceState::default(),
            ),
            parent_span_id: conductor_api::SpanId::INVALID,
            span_kind: SpanKind::Client,
            name: "llm.complete".into(),
            start_time: start,
            end_time: start + std::time::Duration::from_millis(5),
            attributes: vec![
                KeyValue::new("llm.model", "sonnet"),
                KeyValue::new("llm.tokens", 42i64),
            ],
            events: Vec::new(),
            status: Status::Ok,
            service_name: "test".into(),
        };
        let request = into_request(vec![span]);
        let bytes = request.encode_to_vec();
        let decoded = proto::ExportTraceServiceRequest::decode(bytes.as_slice()).unwrap();
        let spans = &decoded.resource_spans[0].scope_spans[0].spans;
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "llm.complete");
        assert_eq!(spans[0].kind, proto::span::SpanKind::Client as i32);
        assert_eq!(spans[0].attributes.len(), 2);
        assert!(spans[0].parent_span_id.is_empty());
        assert_eq!(
            spans[0].status.as_ref().unwrap().code,
            proto::status::StatusCode::Ok as i32
        );
    }
}
