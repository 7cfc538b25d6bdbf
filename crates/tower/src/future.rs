// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::task::{Poll, ready};

use http::Response;
use pin_project_lite::pin_project;

use crate::{
    guard::SpanGuard,
    status::{CapturedStatus, TracedBody},
};

pin_project! {
    /// The response future of a [`crate::TraceService`].
    ///
    /// The inner future is polled with the request span as the current
    /// context. The span is handed over to the response body, or ended right
    /// away if the inner service failed.
    pub struct TraceFuture<F> {
        #[pin]
        inner: F,
        guard: Option<SpanGuard>,
    }
}

impl<F> TraceFuture<F> {
    pub(crate) fn new(inner: F, guard: SpanGuard) -> Self {
        Self {
            inner,
            guard: Some(guard),
        }
    }
}

impl<F, B, E> Future for TraceFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: std::fmt::Display,
{
    type Output = Result<Response<TracedBody<B>>, E>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Self::Output> {
        let this = self.project();

        let _attached = this
            .guard
            .as_ref()
            .and_then(SpanGuard::context)
            .map(|context| context.clone().attach());

        let result = ready!(this.inner.poll(cx));

        match result {
            Ok(response) => {
                let (parts, body) = response.into_parts();

                let mut status = CapturedStatus::new();
                status.record_status(parts.status);
                if let Some(guard) = this.guard.as_ref() {
                    guard.record_status(parts.status);
                }

                let body = TracedBody::new(body, status, this.guard.take());
                Poll::Ready(Ok(Response::from_parts(parts, body)))
            }

            Err(error) => {
                if let Some(mut guard) = this.guard.take() {
                    guard.record_error(std::any::type_name::<E>(), error.to_string());
                    guard.end();
                }

                Poll::Ready(Err(error))
            }
        }
    }
}
