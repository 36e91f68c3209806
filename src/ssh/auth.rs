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

//! Centralized authentication logic for SSH connections.
//!
//! Turns the connection parameters of a storage backend into the ordered
//! list of methods the client offers to the server.

use directories::BaseDirs;
use std::path::PathBuf;
use zeroize::Zeroizing;

use super::tokio_client::AuthMethod;
use crate::config::ConnectionParams;

/// Default private keys looked up in `~/.ssh`, most preferred first.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// Context for determining SSH authentication methods.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Explicitly configured private keys
    pub key_files: Vec<PathBuf>,
    /// Passphrase used for every private key
    pub passphrase: Option<Zeroizing<String>>,
    /// Whether to use SSH agent for authentication
    pub allow_agent: bool,
    /// Whether to look for default keys in the ssh directory
    pub look_for_keys: bool,
    pub password: Option<Zeroizing<String>>,
    /// Directory searched for default keys, `~/.ssh` when unset
    pub ssh_dir: Option<PathBuf>,
}

impl AuthContext {
    pub fn from_params(params: &ConnectionParams) -> Self {
        Self {
            key_files: params.key_filename.clone(),
            passphrase: params.passphrase.clone(),
            allow_agent: params.allow_agent,
            look_for_keys: params.look_for_keys,
            password: params.password.clone(),
            ssh_dir: None,
        }
    }

    /// Search `ssh_dir` instead of `~/.ssh` for default keys.
    pub fn with_ssh_dir(mut self, ssh_dir: impl Into<PathBuf>) -> Self {
        self.ssh_dir = Some(ssh_dir.into());
        self
    }

    /// Determine the authentication methods to try, in order:
    /// 1. Configured key files
    /// 2. SSH agent (if allowed and `SSH_AUTH_SOCK` is set)
    /// 3. Default key locations (~/.ssh/id_ed25519, ~/.ssh/id_ecdsa, ~/.ssh/id_rsa)
    /// 4. Password
    ///
    /// The list may be empty; the client then reports that no method was
    /// available.
    pub fn methods(&self) -> Vec<AuthMethod> {
        let mut methods = Vec::new();
        let passphrase = self.passphrase.as_ref().map(|p| p.as_str());

        for key_path in &self.key_files {
            if key_path.exists() {
                tracing::debug!("Authenticating with key: {:?}", key_path);
                methods.push(AuthMethod::with_key_file(key_path, passphrase));
            } else {
                tracing::warn!("Configured SSH key file not found: {:?}", key_path);
            }
        }

        if self.allow_agent {
            if let Some(agent) = agent_method() {
                methods.push(agent);
            }
        }

        if self.look_for_keys {
            for default_key in self.default_keys() {
                if default_key.exists() && !self.key_files.contains(&default_key) {
                    tracing::debug!("Using default key: {:?}", default_key);
                    methods.push(AuthMethod::with_key_file(&default_key, passphrase));
                }
            }
        }

        if let Some(password) = &self.password {
            methods.push(AuthMethod::Password(password.clone()));
        }

        methods
    }

    fn default_keys(&self) -> Vec<PathBuf> {
        let ssh_dir = match &self.ssh_dir {
            Some(dir) => dir.clone(),
            None => match BaseDirs::new() {
                Some(dirs) => dirs.home_dir().join(".ssh"),
                None => return Vec::new(),
            },
        };
        DEFAULT_KEY_NAMES
            .iter()
            .map(|name| ssh_dir.join(name))
            .collect()
    }
}

#[cfg(not(target_os = "windows"))]
fn agent_method() -> Option<AuthMethod> {
    if std::env::var_os("SSH_AUTH_SOCK").is_some() {
        tracing::debug!("Using SSH agent for authentication");
        Some(AuthMethod::with_agent())
    } else {
        tracing::debug!("SSH_AUTH_SOCK not set, skipping agent authentication");
        None
    }
}

#[cfg(target_os = "windows")]
fn agent_method() -> Option<AuthMethod> {
    None
}
