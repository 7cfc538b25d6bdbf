// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod http;
mod telemetry;

pub use self::{
    http::HttpConfig,
    telemetry::{Propagator, TelemetryConfig, TracingConfig, TracingExporterKind},
};
use crate::{ConfigError, util::ConfigurationSection};

/// Application configuration root
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RootConfig {
    /// Configuration of the HTTP server
    #[serde(default, skip_serializing_if = "HttpConfig::is_default")]
    pub http: HttpConfig,

    /// Configuration related to sending monitoring data
    #[serde(default, skip_serializing_if = "TelemetryConfig::is_default")]
    pub telemetry: TelemetryConfig,
}

impl ConfigurationSection for RootConfig {
    fn validate(&self, figment: &figment::Figment) -> Result<(), ConfigError> {
        self.http.validate(figment)?;
        self.telemetry.validate(figment)?;

        Ok(())
    }
}
