// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use http::Request;

/// Compute the name of the span for a request.
///
/// Requests to a path are named `"{method} {path}"`, e.g. `"GET /foo/bar"`.
/// Requests to the root path include the protocol version instead, e.g.
/// `"HTTP/1.1 GET /"`. The query string is never part of the name.
#[must_use]
pub fn span_name<B>(request: &Request<B>) -> String {
    let path = request.uri().path();
    let route = path.strip_prefix('/').unwrap_or(path);
    let method = request.method();

    if route.is_empty() {
        format!("{version:?} {method} /", version = request.version())
    } else {
        format!("{method} /{route}")
    }
}
