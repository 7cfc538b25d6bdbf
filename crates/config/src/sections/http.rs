// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::net::{Ipv4Addr, SocketAddr};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ConfigurationSection;

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

/// Configuration of the HTTP server
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HttpConfig {
    /// Address and port to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl HttpConfig {
    /// Returns true if all fields are at their default values
    pub(crate) fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl ConfigurationSection for HttpConfig {
    const PATH: Option<&'static str> = Some("http");
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment, Jail,
        providers::{Env, Format, Yaml},
    };

    use super::*;

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    http:
                      listen: '[::]:9000'
                ",
            )?;

            let config = Figment::new()
                .merge(Yaml::file("config.yaml"))
                .extract_inner::<HttpConfig>("http")?;

            assert_eq!(config.listen, "[::]:9000".parse().unwrap());

            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    http:
                      listen: 127.0.0.1:9000
                ",
            )?;
            jail.set_env("TRACEMW_HTTP__LISTEN", "0.0.0.0:8081");

            let config = Figment::new()
                .merge(Yaml::file("config.yaml"))
                .merge(Env::prefixed("TRACEMW_").split("__"))
                .extract_inner::<HttpConfig>("http")?;

            assert_eq!(config.listen, "0.0.0.0:8081".parse().unwrap());

            Ok(())
        });
    }

    #[test]
    fn default_listen_address() {
        let config = HttpConfig::default();
        assert_eq!(config.listen.to_string(), "127.0.0.1:8080");
        assert!(config.is_default());
    }
}
