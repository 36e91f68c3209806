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

//! Errors raised while establishing the SSH/SFTP session.

use std::time::Duration;

/// Failure while connecting, authenticating or opening the SFTP channel.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Connection to {host}:{port} timed out after {}s", .timeout.as_secs())]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("The server host key could not be verified")]
    ServerCheckFailed,

    #[error("Unable to load key, bad format or passphrase: {0}")]
    KeyInvalid(russh::keys::Error),

    #[error("Key authentication failed")]
    KeyAuthFailed,

    #[error("Password authentication failed")]
    PasswordWrong,

    #[error("Failed to connect to SSH agent")]
    AgentConnectionFailed,

    #[error("SSH agent has no identities")]
    AgentNoIdentities,

    #[error("SSH agent authentication failed")]
    AgentAuthenticationFailed,

    #[error("Authentication failed for {username}@{host} (tried: {})", display_methods(.tried))]
    AuthenticationFailed {
        username: String,
        host: String,
        tried: Vec<&'static str>,
    },

    #[error("Failed to read password: {0}")]
    PasswordPrompt(std::io::Error),

    #[error("Failed to open SFTP subsystem: {0}")]
    SftpInit(russh_sftp::client::error::Error),

    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn display_methods(tried: &[&'static str]) -> String {
    if tried.is_empty() {
        "no methods available".to_string()
    } else {
        tried.join(", ")
    }
}

impl Error {
    /// Whether the server rejected our credentials, as opposed to the
    /// connection itself failing.
    ///
    /// Only these errors are eligible for the interactive password fallback.
    /// Host key problems are never treated as authentication failures.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::KeyAuthFailed
                | Error::PasswordWrong
                | Error::AgentConnectionFailed
                | Error::AgentNoIdentities
                | Error::AgentAuthenticationFailed
                | Error::AuthenticationFailed { .. }
        )
    }
}
