// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{borrow::Cow, sync::Arc};

use opentelemetry::{
    KeyValue,
    global::BoxedTracer,
    propagation::TextMapPropagator,
    trace::{Span, Tracer},
};

use crate::{layer::TraceLayer, trace_context::Propagation};

/// The service name used when none was configured
pub const DEFAULT_SERVICE_NAME: &str = "TracedApplication";

/// Configuration of the [`TraceLayer`].
///
/// Every option is optional. The defaults are resolved when the configuration
/// is turned into a layer with [`TraceConfig::layer`]:
///
///  - the tracer defaults to one obtained from the global tracer provider,
///    identified by this crate's name and version
///  - the propagator defaults to the global text map propagator
///  - the service name defaults to [`DEFAULT_SERVICE_NAME`]
///
/// Calling the same option twice keeps the last value.
#[derive(Clone, Default)]
pub struct TraceConfig {
    service_name: Option<Cow<'static, str>>,
    tracer: Option<Arc<BoxedTracer>>,
    propagator: Option<Arc<dyn TextMapPropagator + Send + Sync>>,
    attributes: Vec<KeyValue>,
}

impl std::fmt::Debug for TraceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceConfig")
            .field("service_name", &self.service_name)
            .field("tracer", &self.tracer.as_ref().map(|_| "BoxedTracer"))
            .field("propagator", &self.propagator)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl TraceConfig {
    /// Create an empty configuration, where everything uses the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom tracer to start the request spans
    #[must_use]
    pub fn with_tracer<T, S>(mut self, tracer: T) -> Self
    where
        T: Tracer<Span = S> + Send + Sync + 'static,
        S: Span + Send + Sync + 'static,
    {
        self.tracer = Some(Arc::new(BoxedTracer::new(Box::new(tracer))));
        self
    }

    /// Use a custom propagator to extract the trace context from the request
    /// headers, and to inject it back for the inner service.
    #[must_use]
    pub fn with_propagator<P>(mut self, propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        self.propagator = Some(Arc::new(propagator));
        self
    }

    /// Set the service name, recorded as the `service.name` attribute of every
    /// span
    #[must_use]
    pub fn with_service_name(mut self, service_name: impl Into<Cow<'static, str>>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Set static attributes added to every span.
    ///
    /// This replaces the attributes set by a previous call.
    #[must_use]
    pub fn with_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// The configured service name, or [`DEFAULT_SERVICE_NAME`]
    #[must_use]
    pub fn service_name(&self) -> &str {
        match self.service_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_SERVICE_NAME,
        }
    }

    /// The configured static attributes
    #[must_use]
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    /// Resolve the defaults and build the [`TraceLayer`]
    #[must_use]
    pub fn layer(self) -> TraceLayer {
        let service_name = match self.service_name {
            Some(name) if !name.is_empty() => name,
            _ => Cow::Borrowed(DEFAULT_SERVICE_NAME),
        };

        let tracer = self
            .tracer
            .unwrap_or_else(|| Arc::new(crate::default_tracer()));

        let propagator = self
            .propagator
            .map_or(Propagation::Global, Propagation::Custom);

        TraceLayer::from_settings(Settings {
            service_name,
            tracer,
            propagator,
            attributes: self.attributes,
        })
    }
}

/// The configuration once all the defaults were applied. It is shared by all
/// the services created by a layer, and never changes afterwards.
pub(crate) struct Settings {
    pub(crate) service_name: Cow<'static, str>,
    pub(crate) tracer: Arc<BoxedTracer>,
    pub(crate) propagator: Propagation,
    pub(crate) attributes: Vec<KeyValue>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("service_name", &self.service_name)
            .field("propagator", &self.propagator)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry_sdk::propagation::TraceContextPropagator;

    use super::*;

    #[test]
    fn test_service_name_defaults() {
        let config = TraceConfig::new();
        assert_eq!(config.service_name(), DEFAULT_SERVICE_NAME);

        let config = TraceConfig::new().with_service_name("");
        assert_eq!(config.service_name(), DEFAULT_SERVICE_NAME);

        let config = TraceConfig::new()
            .with_service_name("first")
            .with_service_name("checkout");
        assert_eq!(config.service_name(), "checkout");
        assert_eq!(config.layer().service_name(), "checkout");
    }

    #[test]
    fn test_attributes_are_replaced() {
        let config = TraceConfig::new()
            .with_attributes([KeyValue::new("first", "a"), KeyValue::new("other", 1)])
            .with_attributes([KeyValue::new("second", "b")]);

        assert_eq!(config.attributes(), &[KeyValue::new("second", "b")]);
    }

    #[test]
    fn test_debug_output() {
        let config = TraceConfig::new().with_propagator(TraceContextPropagator::new());
        let debug = format!("{config:?}");
        assert!(debug.contains("TraceContextPropagator"));
        assert!(debug.contains("tracer: None"));
    }
}
