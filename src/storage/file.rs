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

//! Buffered handle on a single stored file.
//!
//! A handle starts [`FileState::Fresh`]. The first read pulls the whole
//! remote file into memory, and a write replaces the buffer outright; either
//! moves it to [`FileState::Materialized`]. Closing a handle that was written
//! saves the buffer through the storage backend and ends in
//! [`FileState::Closed`].

use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;
use tokio::io::AsyncReadExt;

use super::Storage;
use crate::error::{Error, Result};

/// Access requested when opening a file, parsed from `"rb"`, `"wb"`,
/// `"r+b"` and the like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    read: bool,
    write: bool,
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode {
        read: true,
        write: false,
    };
    pub const WRITE: OpenMode = OpenMode {
        read: false,
        write: true,
    };
    pub const READ_WRITE: OpenMode = OpenMode {
        read: true,
        write: true,
    };

    pub fn is_readable(&self) -> bool {
        self.read
    }

    pub fn is_writable(&self) -> bool {
        self.write
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::READ
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut base = None;
        let mut plus = false;
        for c in s.chars() {
            match c {
                'r' | 'w' | 'a' | 'x' if base.is_none() => base = Some(c),
                '+' if !plus => plus = true,
                'b' | 't' => {}
                _ => {
                    return Err(Error::InvalidOperation(format!("invalid file mode {s:?}")));
                }
            }
        }

        match (base, plus) {
            (Some('r'), false) => Ok(Self::READ),
            (Some(_), false) => Ok(Self::WRITE),
            (Some(_), true) => Ok(Self::READ_WRITE),
            (None, _) => Err(Error::InvalidOperation(format!(
                "file mode {s:?} must contain one of r, w, a or x"
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match (self.read, self.write) {
            (true, false) => "rb",
            (false, true) => "wb",
            _ => "r+b",
        };
        f.write_str(mode)
    }
}

/// Lifecycle of a [`StorageFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Nothing pulled or written yet.
    Fresh,
    /// The buffer holds the authoritative content.
    Materialized,
    Closed,
}

/// Lazily loaded file returned by [`Storage::open`].
pub struct StorageFile<'a> {
    storage: &'a dyn Storage,
    name: String,
    mode: OpenMode,
    state: FileState,
    buffer: Cursor<Vec<u8>>,
    dirty: bool,
    size: Option<u64>,
}

impl<'a> StorageFile<'a> {
    pub fn new(storage: &'a dyn Storage, name: &str, mode: OpenMode) -> Self {
        Self {
            storage,
            name: name.to_string(),
            mode,
            state: FileState::Fresh,
            buffer: Cursor::new(Vec::new()),
            dirty: false,
            size: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    /// Whether the buffer holds a write that has not been saved yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Read up to `n` bytes, or everything left when `n` is `None`.
    ///
    /// The first read of a readable handle downloads the whole file.
    pub async fn read(&mut self, n: Option<usize>) -> Result<Vec<u8>> {
        match self.state {
            FileState::Closed => return Err(self.closed_error("read")),
            FileState::Fresh if !self.mode.is_readable() => {
                return Err(Error::InvalidOperation(format!(
                    "{} was opened write-only",
                    self.name
                )));
            }
            FileState::Fresh => self.materialize().await?,
            FileState::Materialized => {}
        }

        let out = match n {
            Some(n) => {
                let mut out = vec![0; n];
                let read = Read::read(&mut self.buffer, &mut out)?;
                out.truncate(read);
                out
            }
            None => {
                let mut out = Vec::new();
                Read::read_to_end(&mut self.buffer, &mut out)?;
                out
            }
        };
        Ok(out)
    }

    /// Replace the buffered content with `data`.
    ///
    /// Nothing is sent until [`close`](Self::close).
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.state == FileState::Closed {
            return Err(self.closed_error("write"));
        }
        if !self.mode.is_writable() {
            return Err(Error::InvalidOperation(format!(
                "{} was opened for read-only access",
                self.name
            )));
        }
        self.buffer = Cursor::new(data.to_vec());
        self.dirty = true;
        self.state = FileState::Materialized;
        Ok(())
    }

    /// Size of the stored file, fetched once and cached.
    ///
    /// Pending writes are not reflected.
    pub async fn size(&mut self) -> Result<u64> {
        if self.state == FileState::Closed {
            return Err(self.closed_error("size"));
        }
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = self.storage.size(&self.name).await?;
        self.size = Some(size);
        Ok(size)
    }

    /// Save pending writes and release the buffer. Closing again is a no-op.
    ///
    /// If saving fails the handle stays open and dirty, so the close can be
    /// retried.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == FileState::Closed {
            return Ok(());
        }
        if self.dirty {
            tracing::debug!("Flushing {} bytes to {}", self.buffer.get_ref().len(), self.name);
            let mut content = Cursor::new(self.buffer.get_ref().as_slice());
            self.storage.save(&self.name, &mut content).await?;
            self.dirty = false;
        }
        self.buffer = Cursor::new(Vec::new());
        self.state = FileState::Closed;
        Ok(())
    }

    async fn materialize(&mut self) -> Result<()> {
        tracing::debug!("Fetching {}", self.name);
        let mut stream = self.storage.read(&self.name).await?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await?;
        self.buffer = Cursor::new(data);
        self.state = FileState::Materialized;
        Ok(())
    }

    fn closed_error(&self, op: &str) -> Error {
        Error::InvalidOperation(format!("cannot {op} {}: file is closed", self.name))
    }
}

impl fmt::Debug for StorageFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFile")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl Drop for StorageFile<'_> {
    fn drop(&mut self) {
        if self.dirty {
            tracing::warn!(
                "File {} dropped with unsaved changes; call close() to store them",
                self.name
            );
        }
    }
}
