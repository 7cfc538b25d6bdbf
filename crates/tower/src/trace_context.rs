// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use http::Request;
use opentelemetry::{
    Context, TraceId,
    propagation::{Injector, TextMapPropagator},
    trace::TraceContextExt,
};
use opentelemetry_http::{HeaderExtractor, HeaderInjector};
use tower::{Layer, Service};

/// A trait to get an [`Injector`] from a request.
pub(crate) trait AsInjector {
    type Injector<'a>: Injector
    where
        Self: 'a;

    fn as_injector(&mut self) -> Self::Injector<'_>;
}

impl<B> AsInjector for Request<B> {
    type Injector<'a>
        = HeaderInjector<'a>
    where
        Self: 'a;

    fn as_injector(&mut self) -> Self::Injector<'_> {
        HeaderInjector(self.headers_mut())
    }
}

/// Where the text map propagator comes from
#[derive(Clone, Debug)]
pub(crate) enum Propagation {
    /// Use the propagator registered globally at the time of the request
    Global,

    /// Use a specific propagator
    Custom(Arc<dyn TextMapPropagator + Send + Sync>),
}

impl Propagation {
    fn with<F, T>(&self, mut f: F) -> T
    where
        F: FnMut(&dyn TextMapPropagator) -> T,
    {
        match self {
            Self::Global => opentelemetry::global::get_text_map_propagator(f),
            Self::Custom(propagator) => f(propagator.as_ref()),
        }
    }

    /// Extract the remote trace context from the request headers.
    ///
    /// The headers are read on top of the context the request already runs
    /// in: its context extension if it has one, else the current context.
    /// Without valid trace headers, that context is returned as is, so a
    /// request on a bare server starts a new trace.
    pub(crate) fn extract<B>(&self, request: &Request<B>) -> Context {
        let base = request.otel_context();
        let extractor = HeaderExtractor(request.headers());
        self.with(|propagator| propagator.extract_with_context(&base, &extractor))
    }

    /// Inject the given trace context in the request headers
    pub(crate) fn inject<R: AsInjector>(&self, context: &Context, request: &mut R) {
        let mut injector = request.as_injector();
        self.with(|propagator| propagator.inject_context(context, &mut injector));
    }
}

/// Extension trait to get the OpenTelemetry context of a request
pub trait RequestContextExt {
    /// Get the trace context of the request.
    ///
    /// Requests going through the [`crate::TraceLayer`] carry the context of
    /// the request span. Other requests get the current context.
    fn otel_context(&self) -> Context;
}

impl<B> RequestContextExt for Request<B> {
    fn otel_context(&self) -> Context {
        self.extensions()
            .get::<Context>()
            .cloned()
            .unwrap_or_else(Context::current)
    }
}

/// Get the trace ID of the current context, if there is a valid one
#[must_use]
pub fn current_trace_id() -> Option<TraceId> {
    let context = Context::current();
    let span = context.span();
    let span_context = span.span_context();
    span_context.is_valid().then(|| span_context.trace_id())
}

/// A [`Layer`] that adds the current trace context to outgoing requests.
///
/// This is meant to wrap HTTP clients used by request handlers, so that the
/// requests they send are part of the same trace.
#[derive(Debug, Clone)]
pub struct TraceContextLayer {
    propagation: Propagation,
}

impl Default for TraceContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceContextLayer {
    /// Create a new [`TraceContextLayer`] using the global propagator
    #[must_use]
    pub fn new() -> Self {
        Self {
            propagation: Propagation::Global,
        }
    }

    /// Create a new [`TraceContextLayer`] using the given propagator
    #[must_use]
    pub fn with_propagator<P>(propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        Self {
            propagation: Propagation::Custom(Arc::new(propagator)),
        }
    }
}

impl<S> Layer<S> for TraceContextLayer {
    type Service = TraceContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceContextService {
            inner,
            propagation: self.propagation.clone(),
        }
    }
}

/// A [`Service`] that adds the current trace context to outgoing requests.
#[derive(Debug, Clone)]
pub struct TraceContextService<S> {
    inner: S,
    propagation: Propagation,
}

impl<S, B> Service<Request<B>> for TraceContextService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let context = Context::current();
        self.propagation.inject(&context, &mut req);
        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceState};
    use opentelemetry_sdk::propagation::TraceContextPropagator;

    use super::*;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn custom() -> Propagation {
        Propagation::Custom(Arc::new(TraceContextPropagator::new()))
    }

    #[test]
    fn test_extract_valid_context() {
        let request = Request::builder()
            .header("traceparent", TRACEPARENT)
            .body(())
            .unwrap();

        let context = custom().extract(&request);
        let span = context.span();
        let span_context = span.span_context();
        assert!(span_context.is_valid());
        assert!(span_context.is_remote());
        assert_eq!(
            span_context.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
        assert_eq!(
            span_context.span_id(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap()
        );
    }

    #[test]
    fn test_extract_garbage_falls_back_to_root() {
        let request = Request::builder()
            .header("traceparent", "not-a-trace-context")
            .body(())
            .unwrap();

        let context = custom().extract(&request);
        assert!(!context.span().span_context().is_valid());

        let request = Request::builder().body(()).unwrap();
        let context = custom().extract(&request);
        assert!(!context.has_active_span());
    }

    #[test]
    fn test_extract_keeps_the_enclosing_context() {
        let enclosing = SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let enclosing = Context::new().with_remote_span_context(enclosing);

        // From the request extension
        let mut request = Request::builder().body(()).unwrap();
        request.extensions_mut().insert(enclosing.clone());
        let context = custom().extract(&request);
        assert_eq!(
            context.span().span_context().span_id(),
            SpanId::from_hex("b7ad6b7169203331").unwrap()
        );

        // From the current context
        let request = Request::builder().body(()).unwrap();
        let context = {
            let _attached = enclosing.clone().attach();
            custom().extract(&request)
        };
        assert_eq!(
            context.span().span_context().span_id(),
            SpanId::from_hex("b7ad6b7169203331").unwrap()
        );

        // Trace headers still win over the enclosing context
        let mut request = Request::builder()
            .header("traceparent", TRACEPARENT)
            .body(())
            .unwrap();
        request.extensions_mut().insert(enclosing);
        let context = custom().extract(&request);
        assert_eq!(
            context.span().span_context().span_id(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap()
        );
    }

    #[test]
    fn test_inject_overrides_headers() {
        let span_context = SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let context = Context::new().with_remote_span_context(span_context);

        let mut request = Request::builder()
            .header("traceparent", TRACEPARENT)
            .body(())
            .unwrap();
        custom().inject(&context, &mut request);

        let headers: HashMap<_, _> = request
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_str().unwrap()))
            .collect();
        assert_eq!(
            headers.get("traceparent"),
            Some(&"00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01")
        );
    }
}
