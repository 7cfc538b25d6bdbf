// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::Error as _};

use crate::{ConfigError, ConfigurationSection};

fn sample_rate_example() -> f64 {
    0.5
}

fn service_name_example() -> &'static str {
    "checkout"
}

/// Propagation format for incoming and outgoing requests
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Propagator {
    /// Propagate according to the W3C Trace Context specification
    TraceContext,

    /// Propagate according to the W3C Baggage specification
    Baggage,

    /// Propagate trace context with Jaeger compatible headers
    Jaeger,
}

impl Propagator {
    /// The propagators used when none are configured
    pub const DEFAULT: [Self; 2] = [Self::TraceContext, Self::Baggage];
}

/// Exporter to use when exporting traces
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TracingExporterKind {
    /// Don't export traces
    #[default]
    None,

    /// Export traces to the standard output. Only useful for debugging
    Stdout,
}

/// Configuration related to exporting traces
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct TracingConfig {
    /// Exporter to use when exporting traces
    #[serde(default)]
    pub exporter: TracingExporterKind,

    /// List of propagation formats to use for incoming and outgoing requests
    ///
    /// Defaults to `tracecontext` and `baggage` if empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub propagators: Vec<Propagator>,

    /// Sample rate for traces
    ///
    /// Defaults to `1.0` if not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(example = "sample_rate_example", range(min = 0.0, max = 1.0))]
    pub sample_rate: Option<f64>,
}

impl TracingConfig {
    /// Returns true if all fields are at their default values
    fn is_default(&self) -> bool {
        self.exporter == TracingExporterKind::None
            && self.propagators.is_empty()
            && self.sample_rate.is_none()
    }

    /// The propagators to install, falling back to the defaults
    #[must_use]
    pub fn propagators(&self) -> &[Propagator] {
        if self.propagators.is_empty() {
            &Propagator::DEFAULT
        } else {
            &self.propagators
        }
    }
}

/// Configuration related to sending monitoring data
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryConfig {
    /// Configuration related to exporting traces
    #[serde(default, skip_serializing_if = "TracingConfig::is_default")]
    pub tracing: TracingConfig,

    /// Name of the service, recorded on every request span
    ///
    /// Defaults to `TracedApplication` if not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(example = "service_name_example")]
    pub service_name: Option<String>,

    /// Static attributes added to every request span
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl TelemetryConfig {
    /// Returns true if all fields are at their default values
    pub(crate) fn is_default(&self) -> bool {
        self.tracing.is_default() && self.service_name.is_none() && self.attributes.is_empty()
    }
}

impl ConfigurationSection for TelemetryConfig {
    const PATH: Option<&'static str> = Some("telemetry");

    fn validate(&self, _figment: &figment::Figment) -> Result<(), ConfigError> {
        if let Some(sample_rate) = self.tracing.sample_rate
            && !(0.0..=1.0).contains(&sample_rate)
        {
            return Err(figment::error::Error::custom(
                "Tracing sample rate must be between 0.0 and 1.0",
            )
            .with_path("tracing.sample_rate")
            .into());
        }

        if self.service_name.as_deref().is_some_and(str::is_empty) {
            return Err(figment::error::Error::custom("Service name must not be empty")
                .with_path("service_name")
                .into());
        }

        if self.attributes.keys().any(String::is_empty) {
            return Err(
                figment::error::Error::custom("Attribute names must not be empty")
                    .with_path("attributes")
                    .into(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment, Jail,
        providers::{Format, Yaml},
    };

    use super::*;
    use crate::ConfigurationSectionExt;

    fn jailed(error: ConfigError) -> figment::Error {
        figment::Error::from(error.to_string())
    }

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    telemetry:
                      service_name: checkout
                      attributes:
                        deployment.environment: staging
                      tracing:
                        exporter: stdout
                        propagators: [jaeger]
                        sample_rate: 0.25
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = TelemetryConfig::extract(&figment).map_err(jailed)?;

            assert_eq!(config.service_name.as_deref(), Some("checkout"));
            assert_eq!(
                config
                    .attributes
                    .get("deployment.environment")
                    .map(String::as_str),
                Some("staging")
            );
            assert_eq!(config.tracing.exporter, TracingExporterKind::Stdout);
            assert_eq!(config.tracing.propagators(), &[Propagator::Jaeger]);
            assert_eq!(config.tracing.sample_rate, Some(0.25));

            Ok(())
        });
    }

    #[test]
    fn load_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "http: {}")?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = TelemetryConfig::extract_or_default(&figment).map_err(jailed)?;

            assert!(config.is_default());
            assert_eq!(config.tracing.exporter, TracingExporterKind::None);
            assert_eq!(config.tracing.propagators(), &Propagator::DEFAULT);

            Ok(())
        });
    }

    #[test]
    fn reject_invalid_sample_rate() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    telemetry:
                      tracing:
                        sample_rate: 1.5
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let error = TelemetryConfig::extract(&figment).unwrap_err();
            assert!(error.to_string().contains("sample rate"));

            Ok(())
        });
    }

    #[test]
    fn reject_unknown_propagator() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    telemetry:
                      tracing:
                        propagators: [b3]
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            assert!(TelemetryConfig::extract(&figment).is_err());

            Ok(())
        });
    }
}
