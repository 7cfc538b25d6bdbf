// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::OnceLock;

use opentelemetry::{
    KeyValue,
    propagation::{TextMapCompositePropagator, TextMapPropagator},
};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{IdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions as semcov;
use tracemw_config::{Propagator, TelemetryConfig, TracingConfig, TracingExporterKind};
use tracemw_tower::{DEFAULT_SERVICE_NAME, TraceConfig, TraceLayer};

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

pub fn setup(config: &TelemetryConfig) -> anyhow::Result<()> {
    let propagator = propagator(config.tracing.propagators());
    opentelemetry::global::set_text_map_propagator(propagator);

    init_tracer(&config.tracing, service_name(config))?;

    Ok(())
}

pub fn shutdown() -> opentelemetry_sdk::error::OTelSdkResult {
    if let Some(tracer_provider) = TRACER_PROVIDER.get() {
        tracer_provider.shutdown()?;
    }

    Ok(())
}

/// Build the request tracing layer from the telemetry configuration.
///
/// It uses the global tracer provider and propagator installed by [`setup`].
pub fn trace_layer(config: &TelemetryConfig) -> TraceLayer {
    let attributes = config
        .attributes
        .iter()
        .map(|(key, value)| KeyValue::new(key.clone(), value.clone()));

    TraceConfig::new()
        .with_service_name(service_name(config).to_owned())
        .with_attributes(attributes)
        .layer()
}

fn service_name(config: &TelemetryConfig) -> &str {
    config.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
}

fn match_propagator(propagator: Propagator) -> Box<dyn TextMapPropagator + Send + Sync> {
    use Propagator as P;
    match propagator {
        P::TraceContext => Box::new(TraceContextPropagator::new()),
        P::Baggage => Box::new(BaggagePropagator::new()),
        P::Jaeger => Box::new(opentelemetry_jaeger_propagator::Propagator::new()),
    }
}

fn propagator(propagators: &[Propagator]) -> TextMapCompositePropagator {
    let propagators = propagators.iter().copied().map(match_propagator).collect();

    TextMapCompositePropagator::new(propagators)
}

/// An [`IdGenerator`] which always returns an invalid trace ID and span ID
///
/// This is used when no exporter is configured, so that log lines don't carry
/// trace IDs nobody will ever see.
#[derive(Debug, Clone, Copy)]
struct InvalidIdGenerator;

impl IdGenerator for InvalidIdGenerator {
    fn new_trace_id(&self) -> opentelemetry::TraceId {
        opentelemetry::TraceId::INVALID
    }
    fn new_span_id(&self) -> opentelemetry::SpanId {
        opentelemetry::SpanId::INVALID
    }
}

fn init_tracer(config: &TracingConfig, service_name: &str) -> anyhow::Result<()> {
    let sample_rate = config.sample_rate.unwrap_or(1.0);

    // Follow the sampling decision of the caller if there is one, else sample
    // a ratio of the traces
    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(sample_rate)));

    let tracer_provider_builder = SdkTracerProvider::builder()
        .with_resource(resource(service_name))
        .with_sampler(sampler);

    let tracer_provider = match config.exporter {
        TracingExporterKind::None => tracer_provider_builder
            .with_id_generator(InvalidIdGenerator)
            .with_sampler(Sampler::AlwaysOff)
            .build(),

        TracingExporterKind::Stdout => {
            let exporter = opentelemetry_stdout::SpanExporter::default();
            tracer_provider_builder
                .with_simple_exporter(exporter)
                .build()
        }
    };

    TRACER_PROVIDER
        .set(tracer_provider.clone())
        .map_err(|_| anyhow::anyhow!("TRACER_PROVIDER was set twice"))?;

    opentelemetry::global::set_tracer_provider(tracer_provider);

    Ok(())
}

fn resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_owned())
        .with_attributes([
            KeyValue::new(semcov::resource::SERVICE_VERSION, crate::VERSION),
            KeyValue::new(semcov::resource::PROCESS_RUNTIME_NAME, "rust"),
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagator_fields() {
        let composite = propagator(&[Propagator::TraceContext, Propagator::Jaeger]);
        let fields: Vec<&str> = composite.fields().collect();

        assert!(fields.contains(&"traceparent"));
        assert!(fields.contains(&"uber-trace-id"));
        assert!(!fields.contains(&"baggage"));

        let composite = propagator(&Propagator::DEFAULT);
        let fields: Vec<&str> = composite.fields().collect();
        assert!(fields.contains(&"traceparent"));
        assert!(fields.contains(&"baggage"));
    }

    #[test]
    fn test_trace_layer_service_name() {
        let config = TelemetryConfig::default();
        assert_eq!(trace_layer(&config).service_name(), DEFAULT_SERVICE_NAME);

        let config = TelemetryConfig {
            service_name: Some("checkout".to_owned()),
            ..TelemetryConfig::default()
        };
        assert_eq!(trace_layer(&config).service_name(), "checkout");
    }
}
