// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::sync::Arc;

use tower::Layer;

use crate::{
    config::{Settings, TraceConfig},
    service::TraceService,
};

/// A [`Layer`] which starts a server span for each request going through the
/// wrapped service.
///
/// All the services created by the same layer share its settings.
#[derive(Clone, Debug)]
pub struct TraceLayer {
    settings: Arc<Settings>,
}

impl Default for TraceLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceLayer {
    /// Create a [`TraceLayer`] with the default configuration
    #[must_use]
    pub fn new() -> Self {
        TraceConfig::new().layer()
    }

    /// Create a [`TraceLayer`] from the given configuration
    #[must_use]
    pub fn with_config(config: TraceConfig) -> Self {
        config.layer()
    }

    pub(crate) fn from_settings(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// The service name recorded on every span
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.settings.service_name
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService::new(inner, Arc::clone(&self.settings))
    }
}

/// Wrap a service with a [`TraceLayer`] using the default configuration
pub fn trace<S>(inner: S) -> TraceService<S> {
    TraceLayer::new().layer(inner)
}
