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

//! Configuration type definitions.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

use super::error::ConfigError;
use super::utils::parse_mode;
use crate::ssh::known_hosts::StrictHostKeyChecking;

/// Settings of one storage backend.
///
/// Obtain a validated value through [`StorageConfig::builder`],
/// [`StorageConfig::load`] or [`StorageConfig::from_env`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub host: String,

    /// Absolute directory on the server under which every name is stored.
    pub root_path: String,

    #[serde(default)]
    pub connection_params: ConnectionParams,

    /// Prompt for a password when authentication fails and none was given.
    /// Keep disabled wherever no human is around to answer.
    #[serde(default)]
    pub interactive: bool,

    #[serde(default, deserialize_with = "deserialize_mode")]
    pub file_mode: Option<u32>,

    #[serde(default, deserialize_with = "deserialize_mode")]
    pub dir_mode: Option<u32>,

    #[serde(default)]
    pub uid: Option<u32>,

    #[serde(default)]
    pub gid: Option<u32>,

    /// Defaults to `~/.ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts_file: Option<PathBuf>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub host_key_checking: StrictHostKeyChecking,
}

impl StorageConfig {
    /// Start building a configuration for `host` rooted at `root_path`.
    pub fn builder(host: impl Into<String>, root_path: impl Into<String>) -> StorageConfigBuilder {
        StorageConfigBuilder {
            config: StorageConfig {
                host: host.into(),
                root_path: root_path.into(),
                connection_params: ConnectionParams::default(),
                interactive: false,
                file_mode: None,
                dir_mode: None,
                uid: None,
                gid: None,
                known_hosts_file: None,
                base_url: None,
                host_key_checking: StrictHostKeyChecking::default(),
            },
        }
    }

    /// Check required settings and normalise the root path.
    ///
    /// The root must be remote-absolute. A trailing slash is dropped unless
    /// the root is `/` itself.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.host = self.host.trim().to_string();
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("host"));
        }

        let root = self.root_path.trim();
        if root.is_empty() {
            return Err(ConfigError::MissingField("root_path"));
        }
        if !root.starts_with('/') {
            return Err(ConfigError::RootNotAbsolute(root.to_string()));
        }
        let trimmed = root.trim_end_matches('/');
        self.root_path = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };

        if self.connection_params.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connection_params.port",
                value: "0".to_string(),
            });
        }

        Ok(self)
    }
}

/// Builder returned by [`StorageConfig::builder`].
#[derive(Debug, Clone)]
pub struct StorageConfigBuilder {
    config: StorageConfig,
}

impl StorageConfigBuilder {
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.connection_params.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.connection_params.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.connection_params.port = port;
        self
    }

    /// Add a private key file. May be called more than once.
    pub fn key_filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.connection_params.key_filename.push(path.into());
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.config.connection_params.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// Connect timeout in seconds.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.config.connection_params.timeout = Some(seconds);
        self
    }

    pub fn allow_agent(mut self, allow: bool) -> Self {
        self.config.connection_params.allow_agent = allow;
        self
    }

    pub fn look_for_keys(mut self, look: bool) -> Self {
        self.config.connection_params.look_for_keys = look;
        self
    }

    /// Pass an additional transport option through to the connection step.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .connection_params
            .extra
            .insert(key.into(), value.into());
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.config.interactive = interactive;
        self
    }

    pub fn file_mode(mut self, mode: u32) -> Self {
        self.config.file_mode = Some(mode);
        self
    }

    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.config.dir_mode = Some(mode);
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.config.uid = Some(uid);
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.config.gid = Some(gid);
        self
    }

    pub fn known_hosts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.known_hosts_file = Some(path.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    pub fn host_key_checking(mut self, mode: StrictHostKeyChecking) -> Self {
        self.config.host_key_checking = mode;
        self
    }

    pub fn build(self) -> Result<StorageConfig, ConfigError> {
        self.config.validate()
    }
}

/// Options forwarded to the SSH connection step.
#[derive(Serialize, Deserialize, Clone)]
pub struct ConnectionParams {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub password: Option<Zeroizing<String>>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Private keys to offer, in order. Accepts a single path or a list.
    #[serde(default, deserialize_with = "deserialize_paths")]
    pub key_filename: Vec<PathBuf>,

    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub passphrase: Option<Zeroizing<String>>,

    /// Connect timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default = "default_true")]
    pub allow_agent: bool,

    #[serde(default = "default_true")]
    pub look_for_keys: bool,

    /// Remaining transport options, passed through as strings.
    #[serde(flatten, deserialize_with = "deserialize_extra")]
    pub extra: HashMap<String, String>,
}

impl ConnectionParams {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| *t > 0).map(Duration::from_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        self.extra_seconds("keepalive_interval")
    }

    pub fn inactivity_timeout(&self) -> Option<Duration> {
        self.extra_seconds("inactivity_timeout")
    }

    fn extra_seconds(&self, key: &str) -> Option<Duration> {
        let value = self.extra.get(key)?;
        match value.trim().parse::<u64>() {
            Ok(0) => None,
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => {
                tracing::warn!("Ignoring non-numeric {} value {:?}", key, value);
                None
            }
        }
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            port: default_port(),
            key_filename: Vec::new(),
            passphrase: None,
            timeout: None,
            allow_agent: true,
            look_for_keys: true,
            extra: HashMap::new(),
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .field("key_filename", &self.key_filename)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("allow_agent", &self.allow_agent)
            .field("look_for_keys", &self.look_for_keys)
            .field("extra", &self.extra)
            .finish()
    }
}

fn default_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<Zeroizing<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(Zeroizing::new))
}

fn deserialize_paths<'de, D>(deserializer: D) -> Result<Vec<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(PathBuf),
        Many(Vec<PathBuf>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(path)) => vec![path],
        Some(OneOrMany::Many(paths)) => paths,
    })
}

fn deserialize_extra<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    let raw = HashMap::<String, Scalar>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Scalar::Bool(b) => b.to_string(),
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Text(s) => s,
            };
            (key, value)
        })
        .collect())
}

/// Modes may be integers (`0o755` in YAML) or octal strings (`"0755"`).
fn deserialize_mode<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ModeValue {
        Int(u32),
        Text(String),
    }

    match Option::<ModeValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(ModeValue::Int(mode)) if mode <= 0o7777 => Ok(Some(mode)),
        Some(ModeValue::Int(mode)) => Err(serde::de::Error::custom(format!(
            "permission mode {mode:o} is out of range"
        ))),
        Some(ModeValue::Text(text)) => parse_mode(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid permission mode {text:?}"))),
    }
}
