// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};

mod config;
mod server;

#[derive(Parser, Debug)]
enum Subcommand {
    /// Configuration-related commands
    Config(self::config::Options),

    /// Run the demo web server
    Server(self::server::Options),
}

#[derive(Parser, Debug)]
#[command(version = crate::VERSION)]
pub struct Options {
    /// Path to the configuration file. Can be given multiple times, later
    /// files overriding earlier ones
    #[arg(short, long, global = true, action = clap::ArgAction::Append)]
    config: Vec<Utf8PathBuf>,

    #[command(subcommand)]
    subcommand: Option<Subcommand>,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        use Subcommand as S;
        match self.subcommand {
            Some(S::Config(c)) => c.run(figment).await,
            Some(S::Server(c)) => c.run(figment).await,
            None => self::server::Options::default().run(figment).await,
        }
    }

    /// Get a [`Figment`] instance with the configuration loaded
    pub fn figment(&self) -> Figment {
        let configs = if self.config.is_empty() {
            vec![Utf8PathBuf::from("config.yaml")]
        } else {
            self.config.clone()
        };

        let figment = configs
            .into_iter()
            .fold(Figment::new(), |f, path| f.merge(Yaml::file(path)));

        // The environment overrides the files
        figment.merge(Env::prefixed("TRACEMW_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use tracemw_config::{ConfigurationSection, RootConfig};

    use super::*;

    #[test]
    fn later_sources_override_earlier_ones() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "base.yaml",
                r"
                    http:
                      listen: 127.0.0.1:9000
                    telemetry:
                      service_name: base
                ",
            )?;
            jail.create_file(
                "local.yaml",
                r"
                    telemetry:
                      service_name: local
                ",
            )?;
            jail.set_env("TRACEMW_HTTP__LISTEN", "0.0.0.0:9001");

            let options = Options::parse_from([
                "tracemw",
                "--config",
                "base.yaml",
                "--config",
                "local.yaml",
                "config",
                "check",
            ]);
            let config = RootConfig::extract(&options.figment())
                .map_err(|error| figment::Error::from(error.to_string()))?;

            assert_eq!(config.telemetry.service_name.as_deref(), Some("local"));
            assert_eq!(config.http.listen.to_string(), "0.0.0.0:9001");

            Ok(())
        });
    }
}
