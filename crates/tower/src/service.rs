// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use http::{Request, Response};
use opentelemetry::trace::{SpanBuilder, SpanKind, TraceContextExt};
use tower::Service;

use crate::{
    attributes::request_attributes, config::Settings, future::TraceFuture, guard::SpanGuard,
    naming::span_name, status::TracedBody,
};

/// A [`Service`] which starts a server span for each request, and ends it
/// once the response was fully sent.
#[derive(Clone, Debug)]
pub struct TraceService<S> {
    inner: S,
    settings: Arc<Settings>,
}

impl<S> TraceService<S> {
    pub(crate) fn new(inner: S, settings: Arc<Settings>) -> Self {
        Self { inner, settings }
    }

    /// Get a reference to the inner service
    #[must_use]
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap the inner service
    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: std::fmt::Display,
{
    type Response = Response<TracedBody<ResBody>>;
    type Error = S::Error;
    type Future = TraceFuture<S::Future>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let settings = &self.settings;

        let parent = settings.propagator.extract(&request);

        let mut attributes = request_attributes(&request, &settings.service_name);
        attributes.extend(settings.attributes.iter().cloned());

        let span = SpanBuilder::from_name(span_name(&request))
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(settings.tracer.as_ref(), &parent);

        let context = parent.with_span(span);

        {
            let span = context.span();
            let span_context = span.span_context();
            tracing::debug!(
                http.request.method = %request.method(),
                url.path = request.uri().path(),
                trace_id = %span_context.trace_id(),
                span_id = %span_context.span_id(),
                remote_parent = parent.span().span_context().is_remote(),
                "Started request span"
            );
        }

        // Make the span the parent of anything the inner service does, whether
        // it reads the context from the request or from the headers
        request.extensions_mut().insert(context.clone());
        settings.propagator.inject(&context, &mut request);

        // A panicking call drops the guard, which ends the span
        let guard = SpanGuard::new(context);
        let inner = {
            let _attached = guard.context().map(|context| context.clone().attach());
            self.inner.call(request)
        };

        TraceFuture::new(inner, guard)
    }
}
