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

//! Storage contract and the remote filesystem it is built on.
//!
//! [`Storage`] is what callers program against: logical names, whole-file
//! saves and reads, existence checks and URLs. [`RemoteFs`] is the small set
//! of SFTP primitives the adapter needs; [`sftp::SftpRemoteFs`] provides it
//! over a live session and [`memory::MemoryFs`] without a network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

mod adapter;
mod file;
pub mod memory;
pub mod path;
pub mod sftp;

pub use adapter::SftpStorage;
pub use file::{FileState, OpenMode, StorageFile};

use crate::error::Result;

/// A readable byte stream returned by [`Storage::read`].
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Backend-independent file storage keyed by logical names.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store everything readable from `content` under `name` and return the
    /// name it was stored as.
    async fn save(&self, name: &str, content: &mut (dyn AsyncRead + Send + Unpin))
        -> Result<String>;

    async fn read(&self, name: &str) -> Result<ByteStream>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// `false` for anything that cannot be found. Only transport failures
    /// are reported as errors.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Subdirectory names and file names directly under `name`, in the order
    /// the server lists them.
    async fn listdir(&self, name: &str) -> Result<(Vec<String>, Vec<String>)>;

    async fn size(&self, name: &str) -> Result<u64>;

    async fn accessed_time(&self, name: &str) -> Result<DateTime<Utc>>;

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>>;

    fn url(&self, name: &str) -> Result<String>;

    /// Open a lazy file handle. Nothing is transferred until the handle is
    /// read, sized or closed dirty.
    fn open(&self, name: &str, mode: OpenMode) -> StorageFile<'_>
    where
        Self: Sized,
    {
        StorageFile::new(self, name, mode)
    }
}

/// Attributes of a remote path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub size: Option<u64>,
    pub is_dir: bool,
    pub permissions: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Seconds since the epoch
    pub atime: Option<u32>,
    /// Seconds since the epoch
    pub mtime: Option<u32>,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: String,
    pub metadata: RemoteMetadata,
}

/// Classification of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    NotFound,
    PermissionDenied,
    /// The server refused the request without saying why.
    Failure,
    /// The session itself is unusable.
    Transport,
}

/// Error returned by a [`RemoteFs`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    kind: RemoteErrorKind,
    message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(RemoteErrorKind::NotFound, format!("No such file: {path}"))
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }

    pub fn is_transport(&self) -> bool {
        self.kind == RemoteErrorKind::Transport
    }
}

/// SFTP primitives on absolute remote paths.
#[async_trait]
pub trait RemoteFs: Send + Sync {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, RemoteError>;

    async fn open_read(&self, path: &str) -> Result<ByteStream, RemoteError>;

    /// Create or truncate `path` and write `data` to it.
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError>;

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError>;

    /// Create a single directory. The parent must exist.
    async fn mkdir(&self, path: &str) -> Result<(), RemoteError>;

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, RemoteError>;

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), RemoteError>;

    /// Change owner and group together.
    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError>;

    async fn close(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}
