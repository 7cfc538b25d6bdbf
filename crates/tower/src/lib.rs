// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! A [`tower`] middleware which starts an OpenTelemetry server span for each
//! incoming HTTP request.
//!
//! The span continues any upstream trace found in the request headers, carries
//! the standard HTTP and network attributes, is propagated to the inner
//! service, and records the response status code before being ended.
//!
//! ```no_run
//! use opentelemetry::KeyValue;
//! use tower::Layer;
//! use tracemw_tower::TraceConfig;
//!
//! # fn wrap<S>(service: S) -> tracemw_tower::TraceService<S> {
//! let layer = TraceConfig::new()
//!     .with_service_name("checkout")
//!     .with_attributes([KeyValue::new("deployment.environment", "staging")])
//!     .layer();
//!
//! layer.layer(service)
//! # }
//! ```

#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::module_name_repetitions)]

mod attributes;
mod config;
mod future;
mod guard;
mod layer;
mod naming;
mod service;
mod status;
mod trace_context;

use opentelemetry::{InstrumentationScope, global::BoxedTracer};

pub use self::{
    attributes::request_attributes,
    config::{DEFAULT_SERVICE_NAME, TraceConfig},
    future::TraceFuture,
    layer::{TraceLayer, trace},
    naming::span_name,
    service::TraceService,
    status::{CapturedStatus, TracedBody},
    trace_context::{
        RequestContextExt, TraceContextLayer, TraceContextService, current_trace_id,
    },
};

/// The name of the instrumentation scope used by the default tracer
pub const INSTRUMENTATION_NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the instrumentation scope used by the default tracer
pub const INSTRUMENTATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get a tracer from the global tracer provider, identified by this crate's
/// instrumentation scope.
fn default_tracer() -> BoxedTracer {
    let scope = InstrumentationScope::builder(INSTRUMENTATION_NAME)
        .with_version(INSTRUMENTATION_VERSION)
        .with_schema_url(opentelemetry_semantic_conventions::SCHEMA_URL)
        .build();

    opentelemetry::global::tracer_with_scope(scope)
}
