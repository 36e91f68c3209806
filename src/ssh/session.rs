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

//! Lazily established, cached SFTP session.
//!
//! [`SessionManager::session`] connects on first use and hands out the same
//! session afterwards. A failed attempt leaves nothing behind, so the next
//! call starts over. When interactive mode is on and no password was
//! configured, an authentication failure triggers a single password prompt
//! and retry.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::auth::AuthContext;
use super::known_hosts::KnownHosts;
use super::prompt::{PasswordPrompt, TerminalPrompt};
use super::tokio_client::{Client, Config, Error};
use crate::config::{get_current_username, ConnectionParams, StorageConfig};
use crate::storage::sftp::SftpRemoteFs;
use crate::storage::RemoteFs;

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub params: ConnectionParams,
    pub known_hosts: KnownHosts,
}

impl ConnectTarget {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            host: config.host.clone(),
            params: config.connection_params.clone(),
            known_hosts: KnownHosts::new(
                config.known_hosts_file.clone(),
                config.host_key_checking,
            ),
        }
    }

    /// Username to authenticate as; the local user when none is configured.
    pub fn username(&self) -> String {
        self.params
            .username
            .clone()
            .unwrap_or_else(get_current_username)
    }
}

/// Opens an authenticated remote filesystem session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn RemoteFs>, Error>;
}

/// Connects over SSH and opens the SFTP subsystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn RemoteFs>, Error> {
        let params = &target.params;
        let username = target.username();
        let methods = AuthContext::from_params(params).methods();

        for key in params.extra.keys() {
            if key != "keepalive_interval" && key != "inactivity_timeout" {
                tracing::debug!("Ignoring unsupported connection parameter {:?}", key);
            }
        }

        let config = Config {
            keepalive_interval: params.keepalive_interval(),
            inactivity_timeout: params.inactivity_timeout(),
            ..Default::default()
        };

        let client = Client::connect(
            &target.host,
            params.port,
            &username,
            &methods,
            target.known_hosts.clone(),
            config,
            params.connect_timeout(),
        )
        .await?;

        let sftp = client.open_sftp().await?;
        Ok(Arc::new(SftpRemoteFs::new(client, sftp)))
    }
}

struct SessionState {
    remote: Option<Arc<dyn RemoteFs>>,
    target: ConnectTarget,
}

/// Connection Manager owning the single session of a storage backend.
pub struct SessionManager {
    state: Mutex<SessionState>,
    interactive: bool,
    connector: Arc<dyn Connector>,
    prompt: Arc<dyn PasswordPrompt>,
}

impl SessionManager {
    pub fn new(target: ConnectTarget, interactive: bool) -> Self {
        Self {
            state: Mutex::new(SessionState {
                remote: None,
                target,
            }),
            interactive,
            connector: Arc::new(SshConnector),
            prompt: Arc::new(TerminalPrompt),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn PasswordPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Return the cached session, establishing it first if needed.
    ///
    /// Concurrent callers wait for a single connection attempt.
    pub async fn session(&self) -> Result<Arc<dyn RemoteFs>, Error> {
        let mut state = self.state.lock().await;
        if let Some(remote) = &state.remote {
            return Ok(remote.clone());
        }

        let remote = self.establish(&mut state.target).await?;
        state.remote = Some(remote.clone());
        Ok(remote)
    }

    /// Whether a session is currently cached.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.remote.is_some()
    }

    /// Close the cached session, if any.
    pub async fn close(&self) -> Result<(), Error> {
        let remote = self.state.lock().await.remote.take();
        if let Some(remote) = remote {
            tracing::debug!("Closing SFTP session");
            if let Err(e) = remote.close().await {
                tracing::warn!("Error while closing SFTP session: {}", e);
            }
        }
        Ok(())
    }

    async fn establish(&self, target: &mut ConnectTarget) -> Result<Arc<dyn RemoteFs>, Error> {
        target.known_hosts.load();

        tracing::debug!(
            "Connecting to {}:{} as {}",
            target.host,
            target.params.port,
            target.username()
        );

        match self.connector.connect(target).await {
            Ok(remote) => {
                tracing::info!("SFTP session established with {}", target.host);
                Ok(remote)
            }
            Err(e) if e.is_auth_failure() && self.can_prompt(target) => {
                tracing::info!(
                    "Authentication to {} failed ({}), asking for a password",
                    target.host,
                    e
                );
                let mut retry = target.clone();
                let username = retry
                    .params
                    .username
                    .get_or_insert_with(get_current_username)
                    .clone();
                retry.params.password =
                    Some(self.read_password(username, retry.host.clone()).await?);

                let remote = self.connector.connect(&retry).await?;
                tracing::info!("SFTP session established with {}", retry.host);
                // Keep the entered credentials for later reconnects.
                *target = retry;
                Ok(remote)
            }
            Err(e) => {
                tracing::debug!("Connection to {} failed: {}", target.host, e);
                Err(e)
            }
        }
    }

    fn can_prompt(&self, target: &ConnectTarget) -> bool {
        self.interactive && target.params.password.is_none()
    }

    async fn read_password(
        &self,
        username: String,
        host: String,
    ) -> Result<zeroize::Zeroizing<String>, Error> {
        let prompt = self.prompt.clone();
        tokio::task::spawn_blocking(move || prompt.prompt_password(&username, &host))
            .await
            .map_err(|e| Error::PasswordPrompt(std::io::Error::other(e)))?
            .map_err(Error::PasswordPrompt)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}
