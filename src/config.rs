// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::env;
use std::path::PathBuf;

use anyhow::Result;

pub const DEFAULT_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_PROJECT: &str = "production-data-infra";
pub const DEFAULT_BUCKET: &str = "nf_data_lake_prod";
pub const DEFAULT_PREFIX: &str = "iot/octopi";
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub bus_path: PathBuf,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub project: String,
    pub bucket: String,
    /// Key prefix placed in front of the local relative path.
    pub prefix: String,
    pub endpoint: String,
    /// Fixed bearer token. When unset, application default credentials
    /// supply a fresh token for each upload.
    pub access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bus_path = PathBuf::from(env_string("EZO_I2C_BUS", DEFAULT_BUS));
        let storage = StorageConfig {
            project: env_string("EZO_GCS_PROJECT", DEFAULT_PROJECT),
            bucket: env_string("EZO_GCS_BUCKET", DEFAULT_BUCKET),
            prefix: env_string("EZO_GCS_PREFIX", DEFAULT_PREFIX),
            endpoint: env_string("EZO_GCS_ENDPOINT", DEFAULT_ENDPOINT),
            access_token: env_optional("EZO_GCS_ACCESS_TOKEN")
                .or_else(|| env_optional("GOOGLE_OAUTH_ACCESS_TOKEN")),
        };
        Ok(Self { bus_path, storage })
    }

    /// Apply a `--bus` flag over the environment.
    pub fn with_bus(mut self, bus: Option<PathBuf>) -> Self {
        if let Some(bus) = bus {
            self.bus_path = bus;
        }
        self
    }
}

fn env_string(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_variable_falls_back_to_default() {
        env::set_var("EZO_I2C_CONFIG_TEST_BLANK", "   ");
        assert_eq!(env_optional("EZO_I2C_CONFIG_TEST_BLANK"), None);
        assert_eq!(
            env_string("EZO_I2C_CONFIG_TEST_BLANK", DEFAULT_BUCKET),
            DEFAULT_BUCKET
        );
    }

    #[test]
    fn bus_flag_overrides_environment() {
        let config = Config::from_env()
            .unwrap()
            .with_bus(Some(PathBuf::from("/dev/i2c-3")));
        assert_eq!(config.bus_path, PathBuf::from("/dev/i2c-3"));
        assert!(!config.storage.bucket.is_empty());
    }
}
