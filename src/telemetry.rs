//! Logging and tracing setup
//!
//! Service and environment tags come from [`LogConfig`]; nothing is read from
//! or written to the process environment except the standard `RUST_LOG` and
//! `OTEL_EXPORTER_OTLP_ENDPOINT` switches.

use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Tracer;
use opentelemetry_sdk::Resource;
use tracing::{info, info_span, Level, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use crate::config::LogConfig;
use crate::error::{Error, Result};

fn otel_tracer(config: &LogConfig) -> Result<Tracer> {
    let mut attributes = vec![KeyValue::new("service.name", config.service.clone())];
    if let Some(env) = &config.environment {
        attributes.push(KeyValue::new("deployment.environment", env.clone()));
    }

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .with_trace_config(
            opentelemetry_sdk::trace::config().with_resource(Resource::new(attributes)),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|e| Error::ConfigError(format!("failed to install OTLP exporter: {}", e)))
}

/// Install the global subscriber
///
/// Must be called from within a Tokio runtime when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
pub fn init(config: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();
    let tracer = if otel_enabled {
        Some(otel_tracer(config)?)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
        .try_init()
        .map_err(|e| Error::ConfigError(format!("failed to install subscriber: {}", e)))?;

    if otel_enabled {
        info!("OpenTelemetry tracing initialized");
    }
    Ok(())
}

/// Root span carrying the log tags of `config`
pub fn root_span(config: &LogConfig) -> Span {
    info_span!(
        "canary_shift",
        service = %config.service,
        environment = config.environment.as_deref().unwrap_or("unset")
    )
}

/// Flush pending spans
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
