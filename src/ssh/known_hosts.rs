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

use directories::BaseDirs;
use russh::keys::known_hosts::{known_host_keys_path, learn_known_hosts_path};
use russh::keys::PublicKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// Mode for host key checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrictHostKeyChecking {
    /// Always verify host keys (fail on unknown/changed)
    Yes,
    /// Never verify host keys (accept all)
    No,
    /// Verify known hosts, add new ones automatically (TOFU)
    #[default]
    AcceptNew,
}

impl FromStr for StrictHostKeyChecking {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "yes" | "true" => Self::Yes,
            "no" | "false" => Self::No,
            "accept-new" | "tofu" => Self::AcceptNew,
            _ => Self::AcceptNew, // Default
        })
    }
}

/// Outcome of checking a server key against known_hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// The key matches a recorded entry.
    Matched,
    /// The host was unknown and its key has been trusted on first use.
    Learned,
    /// Checking is disabled.
    Unchecked,
    /// The host is unknown and the policy does not allow learning it.
    Unknown,
    /// The host is known with a different key.
    Changed { line: usize },
}

impl HostKeyStatus {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Matched | Self::Learned | Self::Unchecked)
    }
}

/// Trusted host keys loaded from a known_hosts file plus the policy for
/// hosts that are not in it.
#[derive(Debug, Clone)]
pub struct KnownHosts {
    path: Option<PathBuf>,
    mode: StrictHostKeyChecking,
}

impl KnownHosts {
    /// Use `path`, or the user's `~/.ssh/known_hosts` when `None`.
    pub fn new(path: Option<PathBuf>, mode: StrictHostKeyChecking) -> Self {
        let path = path.or_else(get_default_known_hosts_path);
        Self { path, mode }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn mode(&self) -> StrictHostKeyChecking {
        self.mode
    }

    /// Try to read the known_hosts file up front.
    ///
    /// Returns the number of entries found. A missing or unreadable file is
    /// logged and reported as zero entries; it never prevents connecting.
    pub fn load(&self) -> usize {
        let Some(path) = self.path.as_deref() else {
            tracing::warn!("Could not determine known_hosts path, no host keys loaded");
            return 0;
        };

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let entries = content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .count();
                tracing::debug!("Loaded {} host key entries from {:?}", entries, path);
                entries
            }
            Err(e) => {
                tracing::warn!("Failed to load known_hosts file {:?}: {}", path, e);
                0
            }
        }
    }

    /// Check `server_key` for `host:port` according to the configured mode,
    /// recording the key when the host is new and the mode allows it.
    pub fn verify(&self, host: &str, port: u16, server_key: &PublicKey) -> HostKeyStatus {
        if self.mode == StrictHostKeyChecking::No {
            tracing::debug!("Host key checking disabled (strict mode = no)");
            return HostKeyStatus::Unchecked;
        }

        let Some(path) = self.path.as_deref() else {
            return match self.mode {
                StrictHostKeyChecking::AcceptNew => {
                    tracing::warn!(
                        "No known_hosts path, accepting host key for {}:{} without recording it",
                        host,
                        port
                    );
                    HostKeyStatus::Learned
                }
                _ => HostKeyStatus::Unknown,
            };
        };

        let known = match known_host_keys_path(host, port, path) {
            Ok(known) => known,
            Err(e) => {
                tracing::warn!("Failed to read known_hosts file {:?}: {}", path, e);
                Vec::new()
            }
        };

        if known.iter().any(|(_, key)| key == server_key) {
            return HostKeyStatus::Matched;
        }

        if let Some((line, _)) = known.first() {
            tracing::error!(
                "Host key for {}:{} does not match known_hosts line {} in {:?}",
                host,
                port,
                line,
                path
            );
            return HostKeyStatus::Changed { line: *line };
        }

        match self.mode {
            StrictHostKeyChecking::AcceptNew => {
                self.learn(host, port, server_key, path);
                HostKeyStatus::Learned
            }
            _ => HostKeyStatus::Unknown,
        }
    }

    fn learn(&self, host: &str, port: u16, server_key: &PublicKey, path: &Path) {
        if let Some(ssh_dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(ssh_dir) {
                tracing::warn!("Failed to create known_hosts directory {:?}: {}", ssh_dir, e);
            }
        }

        match learn_known_hosts_path(host, port, server_key, path) {
            Ok(()) => tracing::info!(
                "Added host key for {}:{} to known_hosts {:?}",
                host,
                port,
                path
            ),
            Err(e) => tracing::warn!(
                "Trusting host key for {}:{} but failed to record it in {:?}: {}",
                host,
                port,
                path,
                e
            ),
        }
    }
}
