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


//! Scripted connection and prompt doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zeroize::Zeroizing;

use sftpstore::ssh::tokio_client::Error;
use sftpstore::ssh::{ConnectTarget, Connector, PasswordPrompt};
use sftpstore::storage::memory::MemoryFs;
use sftpstore::storage::RemoteFs;
use sftpstore::{SftpStorage, StorageConfig};

pub const ROOT: &str = "/srv/files";

/// What the next connection attempt does.
pub enum Outcome {
    Connect(Arc<MemoryFs>),
    AuthFailure,
    HostKeyRejected,
}

/// Connector that replays a fixed list of outcomes and records every
/// target it was asked to connect to.
#[derive(Default)]
pub struct ScriptedConnector {
    outcomes: Mutex<VecDeque<Outcome>>,
    targets: Mutex<Vec<ConnectTarget>>,
    delay: Option<Duration>,
}

impl ScriptedConnector {
    pub fn new(outcomes: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn slow(outcomes: impl IntoIterator<Item = Outcome>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn push(&self, outcome: Outcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.targets.lock().unwrap().len()
    }

    pub fn targets(&self) -> Vec<ConnectTarget> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn RemoteFs>, Error> {
        self.targets.lock().unwrap().push(target.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Outcome::Connect(fs)) => Ok(fs as Arc<dyn RemoteFs>),
            Some(Outcome::HostKeyRejected) => Err(Error::ServerCheckFailed),
            Some(Outcome::AuthFailure) | None => Err(Error::AuthenticationFailed {
                username: target.username(),
                host: target.host.clone(),
                tried: vec!["publickey", "password"],
            }),
        }
    }
}

/// Prompt that answers with a fixed password, or fails when it has none.
pub struct ScriptedPrompt {
    password: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedPrompt {
    pub fn answering(password: &str) -> Arc<Self> {
        Arc::new(Self {
            password: Some(password.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            password: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PasswordPrompt for ScriptedPrompt {
    fn prompt_password(&self, _username: &str, _host: &str) -> std::io::Result<Zeroizing<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.password {
            Some(password) => Ok(Zeroizing::new(password.clone())),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no terminal available",
            )),
        }
    }
}

/// Remote filesystem with the storage root already in place.
pub fn remote() -> Arc<MemoryFs> {
    let fs = Arc::new(MemoryFs::new());
    fs.create_dir_all(ROOT);
    fs
}

pub fn config() -> StorageConfig {
    StorageConfig::builder("files.example.com", ROOT)
        .username("deploy")
        .known_hosts_file("/nonexistent/sftpstore-test/known_hosts")
        .build()
        .unwrap()
}

/// Storage over `fs` that connects successfully on the first attempt.
pub fn storage_on(fs: &Arc<MemoryFs>, config: StorageConfig) -> SftpStorage {
    SftpStorage::new(config)
        .unwrap()
        .with_connector(ScriptedConnector::new([Outcome::Connect(fs.clone())]))
        .with_prompt(ScriptedPrompt::failing())
}
