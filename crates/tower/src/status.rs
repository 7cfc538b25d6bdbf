// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use http::StatusCode;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;

use crate::guard::SpanGuard;

/// The status code of a response, as seen by the middleware.
///
/// An explicitly set status always replaces the previous one, since only one
/// status line is ever sent. Writing body data before any status was set
/// records the implicit `200 OK`.
///
/// An [`http::Response`] always carries its status before its body, so the
/// [`crate::TraceLayer`] records it once from the response head, and
/// [`TracedBody`] never has to fall back to the implicit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturedStatus {
    status: Option<StatusCode>,
}

impl CapturedStatus {
    /// Create a recorder with no status yet
    #[must_use]
    pub const fn new() -> Self {
        Self { status: None }
    }

    /// Record an explicitly set status
    pub fn record_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Record a write of body data
    pub fn record_write(&mut self) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
    }

    /// The captured status code, or `0` if it isn't known yet
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.map_or(0, |status| status.as_u16())
    }

    /// The captured status code, if any
    #[must_use]
    pub const fn status_code(&self) -> Option<StatusCode> {
        self.status
    }
}

pin_project! {
    /// The body of a response going through the [`crate::TraceLayer`].
    ///
    /// It forwards every frame and every hint of the inner body untouched, and
    /// ends the request span once the body was fully sent, failed, or was
    /// dropped.
    pub struct TracedBody<B> {
        #[pin]
        inner: B,
        status: CapturedStatus,
        guard: Option<SpanGuard>,
    }
}

impl<B> TracedBody<B> {
    pub(crate) fn new(inner: B, status: CapturedStatus, guard: Option<SpanGuard>) -> Self {
        Self {
            inner,
            status,
            guard,
        }
    }

    /// The status code captured for this response, `0` if it isn't known
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.status()
    }

    /// Get a reference to the inner body
    #[must_use]
    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    /// Unwrap the inner body. This ends the request span.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B> std::fmt::Debug for TracedBody<B>
where
    B: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedBody")
            .field("inner", &self.inner)
            .field("status", &self.status)
            .field("span_ended", &self.guard.is_none())
            .finish()
    }
}

impl<B> Body for TracedBody<B>
where
    B: Body,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let result = ready!(this.inner.poll_frame(cx));

        match &result {
            Some(Ok(_)) => {}

            Some(Err(_)) => {
                if let Some(mut guard) = this.guard.take() {
                    guard.record_error(
                        std::any::type_name::<B::Error>(),
                        "failed to send the response body",
                    );
                    guard.end();
                }
            }

            None => {
                if let Some(mut guard) = this.guard.take() {
                    guard.end();
                }
            }
        }

        Poll::Ready(result)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
