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

//! SSH authentication methods.
//!
//! This module provides the authentication mechanisms the storage session
//! can be configured with:
//! - Password authentication (with keyboard-interactive as a fallback for
//!   servers that only expose passwords through it)
//! - Private key authentication from a file
//! - SSH agent authentication

use russh::client::{Handle, Handler, KeyboardInteractiveAuthResponse};
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

/// One way of proving identity to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKeyFile {
        key_file_path: PathBuf,
        key_pass: Option<Zeroizing<String>>,
    },
    #[cfg(not(target_os = "windows"))]
    Agent,
}

impl AuthMethod {
    /// Convenience method to create a [`AuthMethod`] from a string literal.
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key_file<T: AsRef<std::path::Path>>(
        key_file_path: T,
        passphrase: Option<&str>,
    ) -> Self {
        Self::PrivateKeyFile {
            key_file_path: key_file_path.as_ref().to_path_buf(),
            key_pass: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    /// Creates a new SSH agent authentication method.
    ///
    /// The SSH agent must be running and the SSH_AUTH_SOCK environment
    /// variable must be set.
    #[cfg(not(target_os = "windows"))]
    pub fn with_agent() -> Self {
        Self::Agent
    }

    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::PrivateKeyFile { .. } => "publickey",
            #[cfg(not(target_os = "windows"))]
            Self::Agent => "agent",
        }
    }
}

/// Authenticate `username` on `handle` with a single method.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    auth: &AuthMethod,
) -> Result<(), super::Error> {
    match auth {
        AuthMethod::Password(password) => {
            let result = handle.authenticate_password(username, &***password).await?;
            if result.success() {
                return Ok(());
            }
            tracing::debug!("Password rejected, trying keyboard-interactive");
            authenticate_keyboard_interactive(handle, username, password).await?;
        }
        AuthMethod::PrivateKeyFile {
            key_file_path,
            key_pass,
        } => {
            let key = russh::keys::load_secret_key(
                key_file_path,
                key_pass.as_ref().map(|pass| pass.as_str()),
            )
            .map_err(super::Error::KeyInvalid)?;
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            let result = handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await?;
            if !result.success() {
                tracing::debug!("Key {:?} rejected", key_file_path);
                return Err(super::Error::KeyAuthFailed);
            }
        }
        #[cfg(not(target_os = "windows"))]
        AuthMethod::Agent => authenticate_with_agent(handle, username).await?,
    };
    Ok(())
}

/// Offer every identity held by the agent until the server accepts one.
#[cfg(not(target_os = "windows"))]
async fn authenticate_with_agent<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
) -> Result<(), super::Error> {
    let mut agent = russh::keys::agent::client::AgentClient::connect_env()
        .await
        .map_err(|e| {
            tracing::debug!("Cannot reach SSH agent: {}", e);
            super::Error::AgentConnectionFailed
        })?;

    let identities = agent.request_identities().await.map_err(|e| {
        tracing::debug!("SSH agent refused to list identities: {}", e);
        super::Error::AgentConnectionFailed
    })?;
    if identities.is_empty() {
        return Err(super::Error::AgentNoIdentities);
    }

    let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
    for (index, identity) in identities.into_iter().enumerate() {
        match handle
            .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(()),
            Ok(_) => tracing::debug!("Agent identity #{} rejected", index),
            Err(e) => tracing::debug!("Agent identity #{} failed: {:?}", index, e),
        }
    }
    Err(super::Error::AgentAuthenticationFailed)
}

/// Answer every keyboard-interactive prompt with the password.
async fn authenticate_keyboard_interactive<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    password: &Zeroizing<String>,
) -> Result<(), super::Error> {
    let mut res = handle
        .authenticate_keyboard_interactive_start(username, None::<String>)
        .await?;
    loop {
        let prompts = match res {
            KeyboardInteractiveAuthResponse::Success => return Ok(()),
            KeyboardInteractiveAuthResponse::Failure { .. } => {
                return Err(super::Error::PasswordWrong);
            }
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => prompts,
        };

        let responses = prompts
            .iter()
            .map(|_| password.to_string())
            .collect::<Vec<_>>();

        res = handle
            .authenticate_keyboard_interactive_respond(responses)
            .await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_method_names() {
        assert_eq!(AuthMethod::with_password("secret").name(), "password");
        assert_eq!(
            AuthMethod::with_key_file("/home/deploy/.ssh/id_ed25519", None).name(),
            "publickey"
        );
        #[cfg(not(target_os = "windows"))]
        assert_eq!(AuthMethod::with_agent().name(), "agent");
    }

    #[test]
    fn test_key_file_keeps_passphrase() {
        let method = AuthMethod::with_key_file("/keys/id_rsa", Some("hunter2"));
        match method {
            AuthMethod::PrivateKeyFile {
                key_file_path,
                key_pass,
            } => {
                assert_eq!(key_file_path, PathBuf::from("/keys/id_rsa"));
                assert_eq!(key_pass.as_deref().map(|p| p.as_str()), Some("hunter2"));
            }
            _ => panic!("Expected PrivateKeyFile auth method"),
        }
    }
}
