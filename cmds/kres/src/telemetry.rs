//! Logging and span export for the `kres` binary.

use std::io::IsTerminal;

use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
	layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

const SERVICE_NAME: &str = "kres";

/// Keeps the span exporter alive. Pending spans are flushed on drop.
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
	fn drop(&mut self) {
		let Some(provider) = self.tracer_provider.take() else {
			return;
		};
		if let Err(e) = provider.shutdown() {
			eprintln!("kres: span export shutdown failed: {e}");
		}
	}
}

/// Transport used for OTLP span export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtlpTransport {
	Grpc,
	Http,
}

impl OtlpTransport {
	/// `grpc` selects tonic, any other protocol value falls back to HTTP.
	fn from_protocol(protocol: Option<&str>) -> Self {
		match protocol.unwrap_or(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL_DEFAULT) {
			"grpc" => Self::Grpc,
			_ => Self::Http,
		}
	}
}

/// `--log-level` overrides `RUST_LOG`; with neither, `info` is used.
fn filter(log_level: Option<Level>) -> EnvFilter {
	if let Some(level) = log_level {
		return EnvFilter::new(level.as_str());
	}
	EnvFilter::builder()
		.with_default_directive(Level::INFO.into())
		.from_env_lossy()
}

/// Human-readable output on a terminal, JSON lines when piped. Always stderr.
fn stderr_layer<S>() -> Box<dyn Layer<S> + Send + Sync>
where
	S: Subscriber + for<'span> LookupSpan<'span>,
{
	let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
	if std::io::stderr().is_terminal() {
		layer.pretty().boxed()
	} else {
		layer.json().boxed()
	}
}

fn export_requested() -> bool {
	[
		opentelemetry_otlp::OTEL_EXPORTER_OTLP_ENDPOINT,
		opentelemetry_otlp::OTEL_EXPORTER_OTLP_TRACES_ENDPOINT,
	]
	.iter()
	.any(|var| std::env::var_os(var).is_some())
}

/// Set up the global subscriber.
///
/// Spans are exported over OTLP only when an exporter endpoint is configured.
/// `OTEL_SERVICE_NAME` replaces the `kres` service name.
pub fn init(log_level: Option<Level>) -> Result<TelemetryGuard> {
	let tracer_provider = if export_requested() {
		Some(tracer_provider()?)
	} else {
		None
	};

	let otel_layer = tracer_provider.as_ref().map(|provider| {
		tracing_opentelemetry::layer()
			.with_error_records_to_exceptions(true)
			.with_tracer(provider.tracer(SERVICE_NAME))
	});

	tracing_subscriber::registry()
		.with(filter(log_level))
		.with(stderr_layer())
		.with(otel_layer)
		.init();

	Ok(TelemetryGuard { tracer_provider })
}

fn tracer_provider() -> Result<SdkTracerProvider> {
	// The builder picks up OTEL_SERVICE_NAME and OTEL_RESOURCE_ATTRIBUTES itself.
	let resource = match std::env::var_os("OTEL_SERVICE_NAME") {
		Some(_) => Resource::builder().build(),
		None => Resource::builder().with_service_name(SERVICE_NAME).build(),
	};

	let protocol = std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL).ok();
	let exporter = match OtlpTransport::from_protocol(protocol.as_deref()) {
		OtlpTransport::Grpc => opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.build()?,
		OtlpTransport::Http => opentelemetry_otlp::SpanExporter::builder()
			.with_http()
			.build()?,
	};

	let provider = SdkTracerProvider::builder()
		.with_resource(resource)
		.with_batch_exporter(exporter)
		.build();
	opentelemetry::global::set_tracer_provider(provider.clone());
	Ok(provider)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_explicit_level_wins() {
		assert_eq!(filter(Some(Level::DEBUG)).to_string(), "debug");
		assert_eq!(filter(Some(Level::WARN)).to_string(), "warn");
	}

	#[test]
	fn test_otlp_transport() {
		assert_eq!(OtlpTransport::from_protocol(Some("grpc")), OtlpTransport::Grpc);
		assert_eq!(
			OtlpTransport::from_protocol(Some("http/protobuf")),
			OtlpTransport::Http
		);
	}
}
