// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::borrow::Cow;

use http::StatusCode;
use opentelemetry::{
    Context, KeyValue,
    trace::{Status, TraceContextExt},
};
use opentelemetry_semantic_conventions::attribute::{ERROR_TYPE, HTTP_RESPONSE_STATUS_CODE};

/// Owns the request span, and ends it exactly once: either explicitly with
/// [`SpanGuard::end`], or when dropped.
///
/// The guard is moved from the request future to the response body, so the
/// span covers the whole exchange. If the inner service panics, or if the
/// future or the body is dropped early, the span is still ended while
/// unwinding.
pub(crate) struct SpanGuard {
    context: Option<Context>,
}

impl SpanGuard {
    pub(crate) fn new(context: Context) -> Self {
        Self {
            context: Some(context),
        }
    }

    /// The context carrying the span, if it was not ended yet
    pub(crate) fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Record the response status code on the span.
    ///
    /// Server errors mark the span as failed. Client errors do not: from the
    /// server point of view, the request was handled successfully.
    pub(crate) fn record_status(&self, status: StatusCode) {
        let Some(context) = &self.context else {
            return;
        };

        let span = context.span();
        if !span.is_recording() {
            return;
        }

        span.set_attribute(KeyValue::new(
            HTTP_RESPONSE_STATUS_CODE,
            i64::from(status.as_u16()),
        ));

        if status.is_server_error() {
            span.set_status(Status::error(""));
        }
    }

    /// Mark the span as failed
    pub(crate) fn record_error(
        &self,
        error_type: &'static str,
        description: impl Into<Cow<'static, str>>,
    ) {
        let Some(context) = &self.context else {
            return;
        };

        let span = context.span();
        if !span.is_recording() {
            return;
        }

        span.set_attribute(KeyValue::new(ERROR_TYPE, error_type));
        span.set_status(Status::error(description));
    }

    /// End the span. Calling this more than once does nothing.
    pub(crate) fn end(&mut self) {
        if let Some(context) = self.context.take() {
            let span = context.span();
            tracing::trace!(
                trace_id = %span.span_context().trace_id(),
                span_id = %span.span_context().span_id(),
                "Ending request span"
            );
            span.end();
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.end();
    }
}
