// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use figment::Figment;
use serde::de::DeserializeOwned;

/// The error returned when loading or validating a configuration section
pub type ConfigError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A part of the configuration, loaded from a [`Figment`].
pub trait ConfigurationSection: Sized + DeserializeOwned {
    /// Where this section lives in the configuration. `None` means the root.
    const PATH: Option<&'static str> = None;

    /// Check the values which can't be checked while deserializing
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    fn validate(&self, _figment: &Figment) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Load and validate the section.
    ///
    /// # Errors
    ///
    /// Returns an error if the section is missing, can't be deserialized, or
    /// is invalid
    fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        let this: Self = match Self::PATH {
            Some(path) => figment.extract_inner(path)?,
            None => figment.extract()?,
        };

        this.validate(figment)?;
        Ok(this)
    }
}

/// Load a section which has sensible defaults
pub trait ConfigurationSectionExt: ConfigurationSection + Default {
    /// Load and validate the section, or use its default value if it isn't in
    /// the configuration at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the section can't be deserialized or is invalid
    fn extract_or_default(figment: &Figment) -> Result<Self, ConfigError> {
        match Self::PATH {
            Some(path) if !figment.contains(path) => Ok(Self::default()),
            _ => Self::extract(figment),
        }
    }
}

impl<T: ConfigurationSection + Default> ConfigurationSectionExt for T {}
