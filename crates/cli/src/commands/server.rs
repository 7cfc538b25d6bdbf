// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{net::SocketAddr, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::Parser;
use figment::Figment;
use tower::{Layer, service_fn};
use tracemw_config::{ConfigurationSectionExt, HttpConfig, TelemetryConfig};
use tracing::{Instrument, info, info_span};

use crate::shutdown::{DEFAULT_SHUTDOWN_TIMEOUT, ShutdownManager};

#[derive(Parser, Debug, Default)]
pub(super) struct Options {
    /// The address to listen on, overriding the configuration file
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// How many seconds to wait for in-flight requests on shutdown
    #[arg(long)]
    shutdown_timeout: Option<u64>,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let span = info_span!("cli.run.init").entered();

        let http_config = HttpConfig::extract_or_default(figment)
            .map_err(anyhow::Error::from_boxed)
            .context("Failed to load HTTP config")?;
        let telemetry_config = TelemetryConfig::extract_or_default(figment)
            .map_err(anyhow::Error::from_boxed)
            .context("Failed to load telemetry config")?;

        let timeout = self
            .shutdown_timeout
            .map_or(DEFAULT_SHUTDOWN_TIMEOUT, Duration::from_secs);
        let shutdown = ShutdownManager::new(timeout)?;

        let addr = self.listen.unwrap_or(http_config.listen);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("could not bind to {addr}"))?;
        let local_addr = listener.local_addr()?;

        let trace_layer = crate::telemetry::trace_layer(&telemetry_config);
        info!(
            service.name = trace_layer.service_name(),
            "Listening on http://{local_addr}"
        );

        let service = trace_layer.layer(service_fn(crate::app::handle::<hyper::body::Incoming>));

        shutdown.task_tracker().spawn(
            crate::server::run(
                listener,
                service,
                shutdown.soft_shutdown_token(),
                shutdown.hard_shutdown_token(),
            )
            .instrument(info_span!("cli.server.run", %local_addr)),
        );

        span.exit();

        shutdown.run().await;

        Ok(ExitCode::SUCCESS)
    }
}
