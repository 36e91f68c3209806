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

//! SSH connection management and establishment.
//!
//! This module handles the low-level SSH connection establishment,
//! host key verification, authentication and opening of the SFTP subsystem.

use russh::client::{Config, Handle, Handler};
use russh_sftp::client::SftpSession;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::authentication::AuthMethod;
use crate::ssh::known_hosts::KnownHosts;

/// An authenticated ssh connection to a remote server.
pub struct Client {
    connection_handle: Handle<ClientHandler>,
    username: String,
    host: String,
    port: u16,
}

impl Client {
    /// Open a ssh connection to `host:port` and authenticate as `username`.
    ///
    /// `methods` are tried in order until one is accepted. Methods that the
    /// server rejects, or key files that cannot be loaded, are skipped; any
    /// transport error aborts immediately.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        methods: &[AuthMethod],
        known_hosts: KnownHosts,
        config: Config,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, super::Error> {
        let handler = ClientHandler::new(host.to_string(), port, known_hosts);

        tracing::debug!("Connecting to {}:{}", host, port);
        let connect = russh::client::connect(Arc::new(config), (host, port), handler);
        let mut handle = match connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                super::Error::ConnectTimeout {
                    host: host.to_string(),
                    port,
                    timeout,
                }
            })??,
            None => connect.await?,
        };

        let mut tried = Vec::with_capacity(methods.len());
        let mut authenticated = false;
        for method in methods {
            tried.push(method.name());
            match super::authentication::authenticate(&mut handle, username, method).await {
                Ok(()) => {
                    tracing::debug!("Authenticated {}@{} using {}", username, host, method.name());
                    authenticated = true;
                    break;
                }
                Err(e) if e.is_auth_failure() => {
                    tracing::debug!("{} authentication rejected: {}", method.name(), e);
                }
                Err(super::Error::KeyInvalid(e)) => {
                    tracing::debug!("Skipping unusable key: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        if !authenticated {
            return Err(super::Error::AuthenticationFailed {
                username: username.to_string(),
                host: host.to_string(),
                tried,
            });
        }

        Ok(Self {
            connection_handle: handle,
            username: username.to_string(),
            host: host.to_string(),
            port,
        })
    }

    /// Open a session channel and start the SFTP subsystem on it.
    ///
    /// Some sshd_config does not enable sftp by default, so make sure a line
    /// like `Subsystem sftp internal-sftp` exists on the remote machine.
    pub async fn open_sftp(&self) -> Result<SftpSession, super::Error> {
        let channel = self.connection_handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        SftpSession::new(channel.into_stream())
            .await
            .map_err(super::Error::SftpInit)
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), super::Error> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(super::Error::SshError)
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// SSH client handler for managing server key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    known_hosts: KnownHosts,
}

impl ClientHandler {
    /// Create a new client handler.
    pub fn new(hostname: String, port: u16, known_hosts: KnownHosts) -> Self {
        Self {
            hostname,
            port,
            known_hosts,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let status = self
            .known_hosts
            .verify(&self.hostname, self.port, server_public_key);
        if status.is_trusted() {
            Ok(true)
        } else {
            tracing::error!(
                "Host key verification failed for {}:{} ({:?})",
                self.hostname,
                self.port,
                status
            );
            Err(super::Error::ServerCheckFailed)
        }
    }
}
