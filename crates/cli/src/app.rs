// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! The routes served by the demo server

use std::{convert::Infallible, time::Duration};

use bytes::Bytes;
use headers::{HeaderMapExt as _, UserAgent};
use http::{Method, Request, Response, StatusCode, header::CONTENT_TYPE};
use http_body::Frame;
use http_body_util::{BodyExt, Empty, Full, StreamBody, combinators::UnsyncBoxBody};
use thiserror::Error;

/// The body of every response of the demo server
pub type AppBody = UnsyncBoxBody<Bytes, Infallible>;

/// The number of chunks sent by the streaming route
const STREAM_CHUNKS: u8 = 5;

/// The delay between two chunks of the streaming route
const STREAM_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
enum RouteError {
    #[error("no route for {0}")]
    NotFound(String),

    #[error("method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("invalid status code {code:?}")]
    InvalidStatus {
        code: String,
        #[source]
        source: http::status::InvalidStatusCode,
    },
}

impl RouteError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidStatus { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn into_response(self) -> Response<AppBody> {
        text(self.status(), format!("{self}\n"))
    }
}

fn text(status: StatusCode, body: String) -> Response<AppBody> {
    let mut response = Response::new(Full::new(Bytes::from(body)).boxed_unsync());
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn empty(status: StatusCode) -> Response<AppBody> {
    let mut response = Response::new(Empty::new().boxed_unsync());
    *response.status_mut() = status;
    response
}

fn greeting() -> Response<AppBody> {
    tracing::debug!("Saying hello");

    let body = match tracemw_tower::current_trace_id() {
        Some(trace_id) => format!("Hello from tracemw!\ntrace.id={trace_id}\n"),
        None => "Hello from tracemw!\n".to_owned(),
    };

    text(StatusCode::OK, body)
}

fn status(code: &str) -> Result<Response<AppBody>, RouteError> {
    let status =
        StatusCode::from_bytes(code.as_bytes()).map_err(|source| RouteError::InvalidStatus {
            code: code.to_owned(),
            source,
        })?;

    Ok(text(status, format!("{status}\n")))
}

fn stream() -> Response<AppBody> {
    let chunks = futures_util::stream::unfold(0, |n| async move {
        if n == STREAM_CHUNKS {
            return None;
        }

        if n > 0 {
            tokio::time::sleep(STREAM_INTERVAL).await;
        }

        let frame = Frame::data(Bytes::from(format!("chunk {n}\n")));
        Some((Ok::<_, Infallible>(frame), n + 1))
    });

    Response::new(StreamBody::new(chunks).boxed_unsync())
}

fn route<B>(request: &Request<B>) -> Result<Response<AppBody>, RouteError> {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return Err(RouteError::MethodNotAllowed(request.method().clone()));
    }

    let path = request.uri().path();
    match path {
        "/" => Ok(greeting()),
        "/health" => Ok(empty(StatusCode::NO_CONTENT)),
        "/stream" => Ok(stream()),
        _ => match path.strip_prefix("/status/") {
            Some(code) => status(code),
            None => Err(RouteError::NotFound(path.to_owned())),
        },
    }
}

/// Handle a request to the demo server, and log the response
pub async fn handle<B>(request: Request<B>) -> Result<Response<AppBody>, Infallible> {
    let user_agent: Option<UserAgent> = request.headers().typed_get();
    let user_agent = user_agent.as_ref().map_or("-", UserAgent::as_str);
    let method = request.method();
    let path = request.uri().path();
    let version = request.version();

    let response = route(&request).unwrap_or_else(|error| {
        tracing::debug!(error = &error as &dyn std::error::Error, "Request failed");
        error.into_response()
    });

    let status_code = response.status();
    match status_code.as_u16() {
        100..=399 => tracing::info!(
            name: "http.server.response",
            "\"{method} {path} {version:?}\" {status_code} {user_agent:?}",
        ),
        400..=499 => tracing::warn!(
            name: "http.server.response",
            "\"{method} {path} {version:?}\" {status_code} {user_agent:?}",
        ),
        500..=599 => tracing::error!(
            name: "http.server.response",
            "\"{method} {path} {version:?}\" {status_code} {user_agent:?}",
        ),
        _ => { /* This shouldn't happen */ }
    }

    Ok(response)
}
