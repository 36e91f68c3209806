// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration loading from YAML files and the environment.

use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;
use zeroize::Zeroizing;

use super::error::ConfigError;
use super::types::StorageConfig;
use super::utils::{expand_tilde, parse_bool, parse_mode};
use crate::ssh::known_hosts::StrictHostKeyChecking;

pub const ENV_HOST: &str = "SFTP_STORAGE_HOST";
pub const ENV_ROOT: &str = "SFTP_STORAGE_ROOT";
pub const ENV_INTERACTIVE: &str = "SFTP_STORAGE_INTERACTIVE";
pub const ENV_FILE_MODE: &str = "SFTP_STORAGE_FILE_MODE";
pub const ENV_DIR_MODE: &str = "SFTP_STORAGE_DIR_MODE";
pub const ENV_UID: &str = "SFTP_STORAGE_UID";
pub const ENV_GID: &str = "SFTP_STORAGE_GID";
pub const ENV_KNOWN_HOSTS: &str = "SFTP_KNOWN_HOST_FILE";
pub const ENV_BASE_URL: &str = "SFTP_STORAGE_BASE_URL";
pub const ENV_USER: &str = "SFTP_STORAGE_USER";
pub const ENV_PORT: &str = "SFTP_STORAGE_PORT";
pub const ENV_KEY_FILE: &str = "SFTP_STORAGE_KEY_FILE";
pub const ENV_PASSWORD: &str = "SFTP_STORAGE_PASSWORD";
pub const ENV_HOST_KEY_CHECKING: &str = "SFTP_STORAGE_HOST_KEY_CHECKING";

impl StorageConfig {
    /// Load configuration from a YAML file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let expanded_path = expand_tilde(path);

        let content =
            fs::read_to_string(&expanded_path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: expanded_path.clone(),
                    source,
                })?;

        let mut config: StorageConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: expanded_path.clone(),
                source,
            })?;

        config.known_hosts_file = config.known_hosts_file.map(|p| expand_tilde(&p));
        config.connection_params.key_filename = config
            .connection_params
            .key_filename
            .iter()
            .map(|p| expand_tilde(p))
            .collect();

        tracing::debug!("Loaded storage configuration from {:?}", expanded_path);
        config.validate()
    }

    /// Build a configuration from `SFTP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_value(ENV_HOST).ok_or(ConfigError::MissingField("host"))?;
        let root = env_value(ENV_ROOT).ok_or(ConfigError::MissingField("root_path"))?;

        let mut builder = StorageConfig::builder(host, root);

        if let Some(value) = env_value(ENV_INTERACTIVE) {
            let interactive = parse_bool(&value).ok_or(ConfigError::InvalidValue {
                field: "interactive",
                value,
            })?;
            builder = builder.interactive(interactive);
        }
        if let Some(value) = env_value(ENV_FILE_MODE) {
            builder = builder.file_mode(parse_env_mode("file_mode", value)?);
        }
        if let Some(value) = env_value(ENV_DIR_MODE) {
            builder = builder.dir_mode(parse_env_mode("dir_mode", value)?);
        }
        if let Some(value) = env_value(ENV_UID) {
            builder = builder.uid(parse_env_number("uid", value)?);
        }
        if let Some(value) = env_value(ENV_GID) {
            builder = builder.gid(parse_env_number("gid", value)?);
        }
        if let Some(value) = env_value(ENV_KNOWN_HOSTS) {
            builder = builder.known_hosts_file(expand_tilde(Path::new(&value)));
        }
        if let Some(value) = env_value(ENV_BASE_URL) {
            builder = builder.base_url(value);
        }
        if let Some(value) = env_value(ENV_USER) {
            builder = builder.username(value);
        }
        if let Some(value) = env_value(ENV_PORT) {
            builder = builder.port(parse_env_number("port", value)?);
        }
        if let Some(value) = env_value(ENV_KEY_FILE) {
            builder = builder.key_filename(expand_tilde(Path::new(&value)));
        }
        if let Some(value) = env::var(ENV_PASSWORD).ok().map(Zeroizing::new) {
            if !value.is_empty() {
                builder = builder.password(value.as_str());
            }
        }
        if let Some(value) = env_value(ENV_HOST_KEY_CHECKING) {
            builder = builder.host_key_checking(
                value
                    .parse::<StrictHostKeyChecking>()
                    .unwrap_or_default(),
            );
        }

        builder.build()
    }

    /// Load configuration with priority order:
    /// 1. Explicit --config path
    /// 2. `SFTP_STORAGE_HOST` and friends in the environment
    /// 3. `$XDG_CONFIG_HOME/sftpstore/config.yaml` (or the platform equivalent)
    pub async fn load_with_priority(cli_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = cli_config_path {
            tracing::debug!("Using explicitly specified config file: {:?}", path);
            return Self::load(path).await;
        }

        if env_value(ENV_HOST).is_some() {
            tracing::debug!("Using storage configuration from environment");
            return Self::from_env();
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Found config at {:?}", path);
                Self::load(&path).await
            }
            _ => Err(ConfigError::MissingField("host")),
        }
    }
}

/// Platform configuration file location for the `sftpstore` binary.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "sftpstore").map(|dirs| dirs.config_dir().join("config.yaml"))
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_mode(field: &'static str, value: String) -> Result<u32, ConfigError> {
    parse_mode(&value).ok_or(ConfigError::InvalidValue { field, value })
}

fn parse_env_number<T: std::str::FromStr>(
    field: &'static str,
    value: String,
) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue { field, value })
}
