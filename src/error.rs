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

//! Error type returned by storage operations.
//!
//! # Error Categories
//!
//! - [`Error::Config`]: missing or invalid settings, raised at construction
//! - [`Error::Connection`] and [`Error::Transport`]: the session could not be
//!   established or broke while in use
//! - [`Error::Storage`]: the server refused a single operation
//! - [`Error::InvalidOperation`]: misuse of a file handle

use crate::config::ConfigError;
use crate::ssh::tokio_client;
use crate::storage::{RemoteError, RemoteErrorKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] tokio_client::Error),

    #[error("Connection lost during {op} of {path}: {source}")]
    Transport {
        op: &'static str,
        path: String,
        source: RemoteError,
    },

    #[error("Failed to {op} {path}: {source}")]
    Storage {
        op: &'static str,
        path: String,
        source: RemoteError,
    },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("No base URL configured")]
    NoBaseUrl,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a failed remote call, separating a broken session from an
    /// operation the server refused.
    pub(crate) fn remote(op: &'static str, path: &str, source: RemoteError) -> Self {
        if source.is_transport() {
            Error::Transport {
                op,
                path: path.to_string(),
                source,
            }
        } else {
            Error::Storage {
                op,
                path: path.to_string(),
                source,
            }
        }
    }

    /// Whether the error is about the session rather than a single call.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Transport { .. })
    }

    pub fn is_not_found(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::NotFound)
    }

    /// Kind of the underlying remote failure, if there was one.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Error::Transport { source, .. } | Error::Storage { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
