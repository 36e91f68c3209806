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

//! [`RemoteFs`] over a russh-sftp session.

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode};
use tokio::io::AsyncWriteExt;

use super::{ByteStream, RemoteDirEntry, RemoteError, RemoteErrorKind, RemoteFs, RemoteMetadata};
use crate::ssh::tokio_client::Client;

/// An open SFTP channel together with the connection carrying it.
pub struct SftpRemoteFs {
    sftp: SftpSession,
    client: Client,
}

impl SftpRemoteFs {
    pub fn new(client: Client, sftp: SftpSession) -> Self {
        Self { sftp, client }
    }
}

impl std::fmt::Debug for SftpRemoteFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpRemoteFs")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteFs for SftpRemoteFs {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, RemoteError> {
        tracing::debug!("SFTP stat {}", path);
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| remote_error("stat", path, e))?;
        Ok(metadata_from_attrs(&attrs))
    }

    async fn open_read(&self, path: &str) -> Result<ByteStream, RemoteError> {
        tracing::debug!("SFTP open {} for reading", path);
        let file = self
            .sftp
            .open_with_flags(path, OpenFlags::READ)
            .await
            .map_err(|e| remote_error("open", path, e))?;
        Ok(Box::new(file))
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError> {
        tracing::debug!("SFTP write {} ({} bytes)", path, data.len());
        let mut file = self
            .sftp
            .open_with_flags(
                path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| remote_error("create", path, e))?;

        file.write_all(data)
            .await
            .map_err(|e| io_error("write", path, e))?;
        file.flush()
            .await
            .map_err(|e| io_error("flush", path, e))?;
        file.shutdown()
            .await
            .map_err(|e| io_error("close", path, e))?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        tracing::debug!("SFTP remove {}", path);
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| remote_error("remove", path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        tracing::debug!("SFTP mkdir {}", path);
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| remote_error("mkdir", path, e))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, RemoteError> {
        tracing::debug!("SFTP readdir {}", path);
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| remote_error("readdir", path, e))?;

        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| RemoteDirEntry {
                name: entry.file_name(),
                metadata: metadata_from_attrs(&entry.metadata()),
            })
            .collect())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        tracing::debug!("SFTP chmod {} {:o}", path, mode);
        let mut attrs = FileAttributes::empty();
        attrs.permissions = Some(mode);
        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(|e| remote_error("chmod", path, e))
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        tracing::debug!("SFTP chown {} {}:{}", path, uid, gid);
        let mut attrs = FileAttributes::empty();
        attrs.uid = Some(uid);
        attrs.gid = Some(gid);
        self.sftp
            .set_metadata(path, attrs)
            .await
            .map_err(|e| remote_error("chown", path, e))
    }

    async fn close(&self) -> Result<(), RemoteError> {
        if let Err(e) = self.sftp.close().await {
            tracing::debug!("Closing SFTP channel failed: {}", e);
        }
        self.client
            .disconnect()
            .await
            .map_err(|e| RemoteError::new(RemoteErrorKind::Transport, e.to_string()))
    }
}

fn metadata_from_attrs(attrs: &FileAttributes) -> RemoteMetadata {
    RemoteMetadata {
        size: attrs.size,
        is_dir: attrs.file_type().is_dir(),
        permissions: attrs.permissions,
        uid: attrs.uid,
        gid: attrs.gid,
        atime: attrs.atime,
        mtime: attrs.mtime,
    }
}

fn error_kind(e: &SftpError) -> RemoteErrorKind {
    match e {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => RemoteErrorKind::NotFound,
            StatusCode::PermissionDenied => RemoteErrorKind::PermissionDenied,
            StatusCode::NoConnection | StatusCode::ConnectionLost | StatusCode::BadMessage => {
                RemoteErrorKind::Transport
            }
            _ => RemoteErrorKind::Failure,
        },
        SftpError::IO(_)
        | SftpError::Timeout
        | SftpError::Limited(_)
        | SftpError::UnexpectedPacket
        | SftpError::UnexpectedBehavior(_) => RemoteErrorKind::Transport,
    }
}

fn remote_error(op: &str, path: &str, e: SftpError) -> RemoteError {
    RemoteError::new(error_kind(&e), format!("SFTP {op} '{path}': {e}"))
}

fn io_error(op: &str, path: &str, e: std::io::Error) -> RemoteError {
    let kind = match e.kind() {
        std::io::ErrorKind::NotFound => RemoteErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => RemoteErrorKind::PermissionDenied,
        _ => RemoteErrorKind::Transport,
    };
    RemoteError::new(kind, format!("SFTP {op} '{path}': {e}"))
}
