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

//! In-memory [`RemoteFs`].
//!
//! Behaves like a POSIX SFTP server for the calls the adapter makes: `mkdir`
//! needs an existing parent and fails on an existing path, writes need an
//! existing parent directory, and listings come back in name order. Every
//! call is appended to an operation log so tests can assert on exactly what
//! reached the "server". Failures can be injected per operation and path.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use super::path::parent;
use super::{ByteStream, RemoteDirEntry, RemoteError, RemoteErrorKind, RemoteFs, RemoteMetadata};

const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// One call received by [`MemoryFs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    Stat(String),
    OpenRead(String),
    Write(String),
    Remove(String),
    Mkdir(String),
    ReadDir(String),
    Chmod(String, u32),
    Chown(String, u32, u32),
    Close,
}

impl FsOp {
    /// Operation name used by [`MemoryFs::fail`].
    pub fn name(&self) -> &'static str {
        match self {
            FsOp::Stat(_) => "stat",
            FsOp::OpenRead(_) => "open",
            FsOp::Write(_) => "write",
            FsOp::Remove(_) => "remove",
            FsOp::Mkdir(_) => "mkdir",
            FsOp::ReadDir(_) => "readdir",
            FsOp::Chmod(..) => "chmod",
            FsOp::Chown(..) => "chown",
            FsOp::Close => "close",
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            FsOp::Stat(p)
            | FsOp::OpenRead(p)
            | FsOp::Write(p)
            | FsOp::Remove(p)
            | FsOp::Mkdir(p)
            | FsOp::ReadDir(p)
            | FsOp::Chmod(p, _)
            | FsOp::Chown(p, _, _) => Some(p),
            FsOp::Close => None,
        }
    }

    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            FsOp::Write(_) | FsOp::Remove(_) | FsOp::Mkdir(_) | FsOp::Chmod(..) | FsOp::Chown(..)
        )
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    permissions: u32,
    uid: u32,
    gid: u32,
    atime: u32,
    mtime: u32,
}

impl Node {
    fn dir(now: u32) -> Self {
        Self {
            kind: NodeKind::Dir,
            permissions: DEFAULT_DIR_MODE,
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
        }
    }

    fn file(data: Vec<u8>, now: u32) -> Self {
        Self {
            kind: NodeKind::File(data),
            permissions: DEFAULT_FILE_MODE,
            uid: 0,
            gid: 0,
            atime: now,
            mtime: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    fn metadata(&self) -> RemoteMetadata {
        let size = match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Dir => 4096,
        };
        RemoteMetadata {
            size: Some(size),
            is_dir: self.is_dir(),
            permissions: Some(self.permissions),
            uid: Some(self.uid),
            gid: Some(self.gid),
            atime: Some(self.atime),
            mtime: Some(self.mtime),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<String, Node>,
    ops: Vec<FsOp>,
    failures: HashMap<(String, String), RemoteErrorKind>,
    mkdir_races: HashSet<String>,
    bare: HashSet<String>,
    disconnected: bool,
    closed: bool,
}

/// In-memory remote filesystem with an operation log.
#[derive(Debug)]
pub struct MemoryFs {
    state: Mutex<MemoryState>,
    owner: (u32, u32),
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// An empty filesystem containing only `/`.
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.nodes.insert("/".to_string(), Node::dir(now()));
        Self {
            state: Mutex::new(state),
            owner: (1000, 1000),
        }
    }

    /// Owner and group given to everything created through [`RemoteFs`].
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = (uid, gid);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create `path` and any missing ancestors, bypassing the log.
    pub fn create_dir_all(&self, path: &str) {
        let mut state = self.lock();
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            state
                .nodes
                .entry(current.clone())
                .or_insert_with(|| Node::dir(now()));
        }
    }

    /// Store a file, creating its directories, bypassing the log.
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        if let Some(dir) = parent(path) {
            self.create_dir_all(dir);
        }
        self.lock()
            .nodes
            .insert(path.to_string(), Node::file(data.into(), now()));
    }

    /// Contents of the file at `path`, if there is one.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.lock().nodes.get(path).is_some_and(Node::is_dir)
    }

    /// Metadata of `path` without logging a call.
    pub fn metadata(&self, path: &str) -> Option<RemoteMetadata> {
        self.lock().nodes.get(path).map(Node::metadata)
    }

    /// Set access and modification times of an existing path.
    pub fn set_times(&self, path: &str, atime: u32, mtime: u32) {
        if let Some(node) = self.lock().nodes.get_mut(path) {
            node.atime = atime;
            node.mtime = mtime;
        }
    }

    /// Make every `op` call on `path` fail with `kind`.
    pub fn fail(&self, op: &str, path: &str, kind: RemoteErrorKind) {
        self.lock()
            .failures
            .insert((op.to_string(), path.to_string()), kind);
    }

    /// Simulate another client creating `path` just before our `mkdir`.
    pub fn race_mkdir(&self, path: &str) {
        self.lock().mkdir_races.insert(path.to_string());
    }

    /// Report `path` without size and timestamps, like servers that omit
    /// optional attributes.
    pub fn omit_attributes(&self, path: &str) {
        self.lock().bare.insert(path.to_string());
    }

    /// Drop or restore the connection. While disconnected every call fails
    /// with a transport error.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.lock().disconnected = disconnected;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Every call received so far, oldest first.
    pub fn ops(&self) -> Vec<FsOp> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    /// Record `op` and apply any injected failure for it.
    fn begin(&self, op: FsOp) -> Result<MutexGuard<'_, MemoryState>, RemoteError> {
        let mut state = self.lock();
        let key = (
            op.name().to_string(),
            op.path().unwrap_or_default().to_string(),
        );
        let description = format!("{} {}", op.name(), key.1);
        state.ops.push(op);

        if state.disconnected || state.closed {
            return Err(RemoteError::new(
                RemoteErrorKind::Transport,
                format!("{description}: connection lost"),
            ));
        }
        if let Some(kind) = state.failures.get(&key) {
            return Err(RemoteError::new(
                *kind,
                format!("{description}: injected failure"),
            ));
        }
        Ok(state)
    }

    fn require_parent_dir(state: &MemoryState, path: &str) -> Result<(), RemoteError> {
        match parent(path).and_then(|dir| state.nodes.get(dir)) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("Parent of {path} is not a directory"),
            )),
            None => Err(RemoteError::not_found(path)),
        }
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, RemoteError> {
        let state = self.begin(FsOp::Stat(path.to_string()))?;
        let mut metadata = state
            .nodes
            .get(path)
            .map(Node::metadata)
            .ok_or_else(|| RemoteError::not_found(path))?;
        if state.bare.contains(path) {
            metadata.size = None;
            metadata.atime = None;
            metadata.mtime = None;
        }
        Ok(metadata)
    }

    async fn open_read(&self, path: &str) -> Result<ByteStream, RemoteError> {
        let mut state = self.begin(FsOp::OpenRead(path.to_string()))?;
        let node = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| RemoteError::not_found(path))?;
        match &node.kind {
            NodeKind::File(data) => {
                let data = data.clone();
                node.atime = now();
                Ok(Box::new(Cursor::new(data)))
            }
            NodeKind::Dir => Err(RemoteError::new(
                RemoteErrorKind::Failure,
                format!("{path} is a directory"),
            )),
        }
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError> {
        let mut state = self.begin(FsOp::Write(path.to_string()))?;
        Self::require_parent_dir(&state, path)?;
        let (uid, gid) = self.owner;
        let timestamp = now();
        match state.nodes.get_mut(path) {
            Some(node) if node.is_dir() => {
                return Err(RemoteError::new(
                    RemoteErrorKind::Failure,
                    format!("{path} is a directory"),
                ));
            }
            Some(node) => {
                node.kind = NodeKind::File(data.to_vec());
                node.mtime = timestamp;
            }
            None => {
                let mut node = Node::file(data.to_vec(), timestamp);
                node.uid = uid;
                node.gid = gid;
                state.nodes.insert(path.to_string(), node);
            }
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        let mut state = self.begin(FsOp::Remove(path.to_string()))?;
        match state.nodes.get(path) {
            None => Err(RemoteError::not_found(path)),
            Some(node) if node.is_dir() => Err(RemoteError::new(
                RemoteErrorKind::Failure,
                format!("{path} is a directory"),
            )),
            Some(_) => {
                state.nodes.remove(path);
                Ok(())
            }
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        let mut state = self.begin(FsOp::Mkdir(path.to_string()))?;
        if state.mkdir_races.remove(path) {
            state.nodes.insert(path.to_string(), Node::dir(now()));
        }
        if state.nodes.contains_key(path) {
            return Err(RemoteError::new(
                RemoteErrorKind::Failure,
                format!("{path} already exists"),
            ));
        }
        Self::require_parent_dir(&state, path)?;
        let mut node = Node::dir(now());
        (node.uid, node.gid) = self.owner;
        state.nodes.insert(path.to_string(), node);
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>, RemoteError> {
        let state = self.begin(FsOp::ReadDir(path.to_string()))?;
        match state.nodes.get(path) {
            None => return Err(RemoteError::not_found(path)),
            Some(node) if !node.is_dir() => {
                return Err(RemoteError::new(
                    RemoteErrorKind::NotFound,
                    format!("{path} is not a directory"),
                ));
            }
            Some(_) => {}
        }

        Ok(state
            .nodes
            .iter()
            .filter(|(child, _)| child.as_str() != "/" && parent(child) == Some(path))
            .map(|(child, node)| RemoteDirEntry {
                name: child.rsplit('/').next().unwrap_or_default().to_string(),
                metadata: node.metadata(),
            })
            .collect())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        let mut state = self.begin(FsOp::Chmod(path.to_string(), mode))?;
        let node = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| RemoteError::not_found(path))?;
        node.permissions = mode;
        Ok(())
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), RemoteError> {
        let mut state = self.begin(FsOp::Chown(path.to_string(), uid, gid))?;
        let node = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| RemoteError::not_found(path))?;
        node.uid = uid;
        node.gid = gid;
        Ok(())
    }

    async fn close(&self) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.ops.push(FsOp::Close);
        state.closed = true;
        Ok(())
    }
}

fn now() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_mkdir_requires_parent() {
        let fs = MemoryFs::new();
        let err = fs.mkdir("/a/b").await.unwrap_err();
        assert!(err.is_not_found());

        fs.mkdir("/a").await.unwrap();
        fs.mkdir("/a/b").await.unwrap();
        assert!(fs.is_dir("/a/b"));

        let err = fs.mkdir("/a").await.unwrap_err();
        assert_eq!(err.kind(), RemoteErrorKind::Failure);
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let fs = MemoryFs::new().with_owner(33, 33);
        fs.create_dir_all("/srv");
        fs.write_file("/srv/a.txt", b"hello").await.unwrap();

        let mut stream = fs.open_read("/srv/a.txt").await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");

        let metadata = fs.stat("/srv/a.txt").await.unwrap();
        assert_eq!(metadata.size, Some(5));
        assert_eq!((metadata.uid, metadata.gid), (Some(33), Some(33)));
    }

    #[tokio::test]
    async fn test_read_dir_lists_direct_children_only() {
        let fs = MemoryFs::new();
        fs.insert_file("/srv/b.txt", "b");
        fs.insert_file("/srv/sub/deep.txt", "d");
        fs.insert_file("/srvother/x", "x");

        let names: Vec<String> = fs
            .read_dir("/srv")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["b.txt", "sub"]);

        let root: Vec<String> = fs
            .read_dir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(root, vec!["srv", "srvother"]);
    }

    #[tokio::test]
    async fn test_injected_failures_and_log() {
        let fs = MemoryFs::new();
        fs.insert_file("/srv/a.txt", "a");
        fs.fail("chown", "/srv/a.txt", RemoteErrorKind::PermissionDenied);

        let err = fs.chown("/srv/a.txt", 0, 0).await.unwrap_err();
        assert_eq!(err.kind(), RemoteErrorKind::PermissionDenied);
        assert_eq!(fs.ops(), vec![FsOp::Chown("/srv/a.txt".to_string(), 0, 0)]);

        fs.set_disconnected(true);
        assert!(fs.stat("/srv/a.txt").await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_mkdir_race() {
        let fs = MemoryFs::new();
        fs.race_mkdir("/a");
        let err = fs.mkdir("/a").await.unwrap_err();
        assert_eq!(err.kind(), RemoteErrorKind::Failure);
        assert!(fs.is_dir("/a"));
    }
}
