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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::path::{ancestors, parent, resolve, url_join};
use super::{ByteStream, RemoteError, RemoteErrorKind, RemoteFs, Storage};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::ssh::prompt::PasswordPrompt;
use crate::ssh::session::{ConnectTarget, Connector, SessionManager};

/// Storage backend that keeps files on a remote host over SFTP.
///
/// Construction never touches the network; the session is opened by the
/// first operation that needs it and reused afterwards.
#[derive(Debug)]
pub struct SftpStorage {
    config: StorageConfig,
    session: SessionManager,
}

impl SftpStorage {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let config = config.validate()?;
        let session =
            SessionManager::new(ConnectTarget::from_config(&config), config.interactive);
        Ok(Self { config, session })
    }

    /// Use `connector` instead of a real SSH connection.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.session = self.session.with_connector(connector);
        self
    }

    /// Ask `prompt` for the password in interactive mode.
    pub fn with_prompt(mut self, prompt: Arc<dyn PasswordPrompt>) -> Self {
        self.session = self.session.with_prompt(prompt);
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Absolute remote path of a logical name.
    pub fn remote_path(&self, name: &str) -> String {
        resolve(&self.config.root_path, name)
    }

    /// The established session, connecting first if necessary.
    pub async fn session(&self) -> Result<Arc<dyn RemoteFs>> {
        Ok(self.session.session().await?)
    }

    /// Whether a session is currently open.
    pub async fn is_connected(&self) -> bool {
        self.session.is_connected().await
    }

    /// Close the session. A later operation reconnects.
    pub async fn close(&self) -> Result<()> {
        Ok(self.session.close().await?)
    }

    /// Create the directory `path` (absolute) and any missing ancestors.
    ///
    /// Walks up to the deepest existing ancestor first, then creates the
    /// missing levels top-down, applying the configured directory mode and
    /// ownership to each new directory. Directories that already exist are
    /// left untouched.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let remote = self.session().await?;

        let mut missing = Vec::new();
        for dir in ancestors(path) {
            if is_dir(remote.as_ref(), dir).await? {
                break;
            }
            missing.push(dir);
        }

        for dir in missing.into_iter().rev() {
            tracing::debug!("Creating remote directory {}", dir);
            match remote.mkdir(dir).await {
                Ok(()) => {}
                Err(e) if !e.is_transport() && is_dir(remote.as_ref(), dir).await? => {
                    tracing::debug!("Directory {} appeared concurrently: {}", dir, e);
                    continue;
                }
                Err(e) => return Err(Error::remote("mkdir", dir, e)),
            }

            if let Some(mode) = self.config.dir_mode {
                self.chmod(dir, mode).await?;
            }
            if self.config.uid.is_some() || self.config.gid.is_some() {
                self.chown(dir, self.config.uid, self.config.gid).await?;
            }
        }
        Ok(())
    }

    /// Set permission bits of an absolute remote path.
    pub async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let remote = self.session().await?;
        remote
            .chmod(path, mode)
            .await
            .map_err(|e| Error::remote("chmod", path, e))
    }

    /// Change owner and/or group of an absolute remote path.
    ///
    /// SFTP only sets both together, so a missing side is read from the
    /// current attributes first.
    pub async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        if uid.is_none() && gid.is_none() {
            return Ok(());
        }
        let remote = self.session().await?;

        let (uid, gid) = match (uid, gid) {
            (Some(uid), Some(gid)) => (uid, gid),
            _ => {
                let attrs = remote
                    .stat(path)
                    .await
                    .map_err(|e| Error::remote("stat", path, e))?;
                let current_uid = uid.or(attrs.uid);
                let current_gid = gid.or(attrs.gid);
                match (current_uid, current_gid) {
                    (Some(uid), Some(gid)) => (uid, gid),
                    _ => {
                        return Err(Error::remote(
                            "chown",
                            path,
                            RemoteError::new(
                                RemoteErrorKind::Failure,
                                "server did not report current owner and group",
                            ),
                        ));
                    }
                }
            }
        };

        remote
            .chown(path, uid, gid)
            .await
            .map_err(|e| Error::remote("chown", path, e))
    }

    async fn stat(&self, name: &str) -> Result<super::RemoteMetadata> {
        let path = self.remote_path(name);
        let remote = self.session().await?;
        remote
            .stat(&path)
            .await
            .map_err(|e| Error::remote("stat", &path, e))
    }

    fn timestamp(path: &str, attr: &'static str, seconds: Option<u32>) -> Result<DateTime<Utc>> {
        seconds
            .and_then(|s| DateTime::from_timestamp(i64::from(s), 0))
            .ok_or_else(|| {
                Error::remote(
                    "stat",
                    path,
                    RemoteError::new(
                        RemoteErrorKind::Failure,
                        format!("server did not report {attr}"),
                    ),
                )
            })
    }
}

#[async_trait]
impl Storage for SftpStorage {
    async fn save(
        &self,
        name: &str,
        content: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<String> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;

        let path = self.remote_path(name);
        let remote = self.session().await?;

        if let Some(dir) = parent(&path) {
            if !is_dir(remote.as_ref(), dir).await? {
                self.mkdir(dir).await?;
            }
        }

        tracing::debug!("Saving {} bytes to {}", data.len(), path);
        remote
            .write_file(&path, &data)
            .await
            .map_err(|e| Error::remote("write", &path, e))?;

        if let Some(mode) = self.config.file_mode {
            self.chmod(&path, mode).await?;
        }
        if self.config.uid.is_some() || self.config.gid.is_some() {
            self.chown(&path, self.config.uid, self.config.gid).await?;
        }

        Ok(name.to_string())
    }

    async fn read(&self, name: &str) -> Result<ByteStream> {
        let path = self.remote_path(name);
        let remote = self.session().await?;
        remote
            .open_read(&path)
            .await
            .map_err(|e| Error::remote("read", &path, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.remote_path(name);
        let remote = self.session().await?;
        tracing::debug!("Deleting {}", path);
        remote
            .remove_file(&path)
            .await
            .map_err(|e| Error::remote("delete", &path, e))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.remote_path(name);
        let remote = self.session().await?;
        match remote.stat(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_transport() => Err(Error::remote("stat", &path, e)),
            Err(e) => {
                tracing::debug!("{} does not exist: {}", path, e);
                Ok(false)
            }
        }
    }

    async fn listdir(&self, name: &str) -> Result<(Vec<String>, Vec<String>)> {
        let path = self.remote_path(name);
        let remote = self.session().await?;
        let entries = remote
            .read_dir(&path)
            .await
            .map_err(|e| Error::remote("list", &path, e))?;

        let (dirs, files): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|entry| entry.metadata.is_dir);
        Ok((
            dirs.into_iter().map(|e| e.name).collect(),
            files.into_iter().map(|e| e.name).collect(),
        ))
    }

    async fn size(&self, name: &str) -> Result<u64> {
        let attrs = self.stat(name).await?;
        attrs.size.ok_or_else(|| {
            Error::remote(
                "stat",
                &self.remote_path(name),
                RemoteError::new(RemoteErrorKind::Failure, "server did not report size"),
            )
        })
    }

    async fn accessed_time(&self, name: &str) -> Result<DateTime<Utc>> {
        let attrs = self.stat(name).await?;
        Self::timestamp(&self.remote_path(name), "access time", attrs.atime)
    }

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>> {
        let attrs = self.stat(name).await?;
        Self::timestamp(&self.remote_path(name), "modification time", attrs.mtime)
    }

    fn url(&self, name: &str) -> Result<String> {
        let base_url = self.config.base_url.as_deref().ok_or(Error::NoBaseUrl)?;
        Ok(url_join(base_url, name))
    }
}

/// Whether `path` exists and is a directory. Only transport failures are
/// errors.
async fn is_dir(remote: &dyn RemoteFs, path: &str) -> Result<bool> {
    match remote.stat(path).await {
        Ok(attrs) => Ok(attrs.is_dir),
        Err(e) if e.is_transport() => Err(Error::remote("stat", path, e)),
        Err(_) => Ok(false),
    }
}
