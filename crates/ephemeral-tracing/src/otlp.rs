//! Subscriber installation: stderr fmt logging plus optional OTLP export.

use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{OtlpProtocol, TracingConfig};

/// Flushes and shuts down the tracer provider when dropped.
///
/// Hold it for as long as spans should be exported.
pub struct TracingGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shutdown tracer provider: {e}");
            }
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// Without an `otlp_endpoint` only the fmt layer is installed. If the
/// exporter cannot be built the fmt layer is installed on its own and a
/// warning is logged, so a missing collector never blocks startup.
pub fn init_tracing(config: &TracingConfig) -> TracingGuard {
    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        init_fmt_only(config);
        return TracingGuard { provider: None };
    };

    match build_provider(config, endpoint) {
        Ok(provider) => {
            let tracer = provider.tracer(config.service_name.clone());
            tracing_subscriber::registry()
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .with(fmt_layer())
                .with(env_filter(&config.log_level))
                .init();

            tracing::info!(
                endpoint = %endpoint,
                service = %config.service_name,
                protocol = ?config.protocol,
                "OTLP export enabled"
            );

            TracingGuard {
                provider: Some(provider),
            }
        }
        Err(e) => {
            init_fmt_only(config);
            tracing::warn!(
                error = %e,
                endpoint = %endpoint,
                "OTLP exporter unavailable, logging to stderr only"
            );
            TracingGuard { provider: None }
        }
    }
}

fn init_fmt_only(config: &TracingConfig) {
    tracing_subscriber::registry()
        .with(fmt_layer())
        .with(env_filter(&config.log_level))
        .init();
}

fn fmt_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
}

/// Parse a filter directive, falling back to `info` when it is malformed.
fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_provider(config: &TracingConfig, endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = match config.protocol {
        OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?,
        OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?,
    };

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build())
}
