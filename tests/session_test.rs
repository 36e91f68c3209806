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


mod common;

use common::{config, remote, Outcome, ScriptedConnector, ScriptedPrompt, ROOT};
use sftpstore::ssh::tokio_client;
use sftpstore::{Error, SftpStorage, Storage, StorageConfig};
use std::time::Duration;

fn password_of(target: &sftpstore::ssh::ConnectTarget) -> Option<String> {
    target
        .params
        .password
        .as_ref()
        .map(|password| password.as_str().to_owned())
}

fn interactive_config() -> StorageConfig {
    let mut config = config();
    config.interactive = true;
    config
}

#[tokio::test]
async fn test_construction_does_not_connect() {
    let connector = ScriptedConnector::new([Outcome::Connect(remote())]);
    let storage = SftpStorage::new(config())
        .unwrap()
        .with_connector(connector.clone());

    assert!(storage.url("x").is_err());
    assert_eq!(connector.calls(), 0);

    storage.exists("a").await.unwrap();
    storage.exists("b").await.unwrap();
    assert_eq!(connector.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_connection() {
    let connector = ScriptedConnector::slow(
        [Outcome::Connect(remote())],
        Duration::from_millis(50),
    );
    let storage = SftpStorage::new(config())
        .unwrap()
        .with_connector(connector.clone());

    let (a, b, c) = tokio::join!(
        storage.exists("a"),
        storage.exists("b"),
        storage.listdir("")
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(connector.calls(), 1);
}

#[tokio::test]
async fn test_auth_failure_without_interactive_is_not_cached() {
    let connector = ScriptedConnector::new([Outcome::AuthFailure, Outcome::Connect(remote())]);
    let prompt = ScriptedPrompt::answering("unused");
    let storage = SftpStorage::new(config())
        .unwrap()
        .with_connector(connector.clone())
        .with_prompt(prompt.clone());

    let err = storage.exists("a").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(tokio_client::Error::AuthenticationFailed { .. })
    ));
    assert!(err.is_connection_error());
    assert!(!storage.is_connected().await);
    assert_eq!(prompt.calls(), 0);

    // Nothing was cached, so the next call tries again.
    assert!(storage.exists("a").await.is_ok());
    assert_eq!(connector.calls(), 2);
}

#[tokio::test]
async fn test_interactive_prompts_once_and_retries() {
    let fs = remote();
    let connector = ScriptedConnector::new([Outcome::AuthFailure, Outcome::Connect(fs.clone())]);
    let prompt = ScriptedPrompt::answering("s3cret");
    let storage = SftpStorage::new(interactive_config())
        .unwrap()
        .with_connector(connector.clone())
        .with_prompt(prompt.clone());

    let mut content: &[u8] = b"hi";
    storage.save("hello.txt", &mut content).await.unwrap();

    assert_eq!(prompt.calls(), 1);
    let targets = connector.targets();
    assert_eq!(targets.len(), 2);
    assert_eq!(password_of(&targets[0]), None);
    assert_eq!(password_of(&targets[1]).as_deref(), Some("s3cret"));
    assert_eq!(targets[1].params.username.as_deref(), Some("deploy"));
    assert!(fs.file(&format!("{ROOT}/hello.txt")).is_some());

    // A reconnect reuses the entered password without asking again.
    storage.close().await.unwrap();
    assert!(fs.is_closed());
    connector.push(Outcome::Connect(remote()));
    storage.exists("hello.txt").await.unwrap();
    assert_eq!(prompt.calls(), 1);
    assert_eq!(password_of(&connector.targets()[2]).as_deref(), Some("s3cret"));
}

#[tokio::test]
async fn test_interactive_retry_happens_only_once() {
    let connector = ScriptedConnector::new([Outcome::AuthFailure, Outcome::AuthFailure]);
    let prompt = ScriptedPrompt::answering("wrong");
    let storage = SftpStorage::new(interactive_config())
        .unwrap()
        .with_connector(connector.clone())
        .with_prompt(prompt.clone());

    let err = storage.exists("a").await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(connector.calls(), 2);
    assert_eq!(prompt.calls(), 1);

    // The rejected password is not kept.
    connector.push(Outcome::AuthFailure);
    connector.push(Outcome::Connect(remote()));
    storage.exists("a").await.unwrap();
    assert_eq!(prompt.calls(), 2);
    assert_eq!(password_of(&connector.targets()[2]), None);
}

#[tokio::test]
async fn test_configured_password_disables_prompt() {
    let mut config = StorageConfig::builder("files.example.com", ROOT)
        .username("deploy")
        .password("configured")
        .known_hosts_file("/nonexistent/sftpstore-test/known_hosts")
        .build()
        .unwrap();
    config.interactive = true;

    let connector = ScriptedConnector::new([Outcome::AuthFailure]);
    let prompt = ScriptedPrompt::answering("unused");
    let storage = SftpStorage::new(config)
        .unwrap()
        .with_connector(connector.clone())
        .with_prompt(prompt.clone());

    assert!(storage.exists("a").await.is_err());
    assert_eq!(connector.calls(), 1);
    assert_eq!(prompt.calls(), 0);
}

#[tokio::test]
async fn test_host_key_rejection_does_not_prompt() {
    let connector = ScriptedConnector::new([Outcome::HostKeyRejected]);
    let prompt = ScriptedPrompt::answering("unused");
    let storage = SftpStorage::new(interactive_config())
        .unwrap()
        .with_connector(connector.clone())
        .with_prompt(prompt.clone());

    let err = storage.exists("a").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(tokio_client::Error::ServerCheckFailed)
    ));
    assert_eq!(connector.calls(), 1);
    assert_eq!(prompt.calls(), 0);
}

#[tokio::test]
async fn test_prompt_failure_is_reported() {
    let connector = ScriptedConnector::new([Outcome::AuthFailure]);
    let prompt = ScriptedPrompt::failing();
    let storage = SftpStorage::new(interactive_config())
        .unwrap()
        .with_connector(connector.clone())
        .with_prompt(prompt.clone());

    let err = storage.exists("a").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(tokio_client::Error::PasswordPrompt(_))
    ));
    assert_eq!(connector.calls(), 1);
    assert_eq!(prompt.calls(), 1);
}

#[tokio::test]
async fn test_prompt_uses_local_user_when_none_configured() {
    let mut config = StorageConfig::builder("files.example.com", ROOT)
        .known_hosts_file("/nonexistent/sftpstore-test/known_hosts")
        .build()
        .unwrap();
    config.interactive = true;

    let connector = ScriptedConnector::new([Outcome::AuthFailure, Outcome::Connect(remote())]);
    let storage = SftpStorage::new(config)
        .unwrap()
        .with_connector(connector.clone())
        .with_prompt(ScriptedPrompt::answering("pw"));

    storage.exists("a").await.unwrap();
    let targets = connector.targets();
    assert_eq!(targets[0].params.username, None);
    assert_eq!(
        targets[1].params.username.as_deref(),
        Some(sftpstore::config::get_current_username().as_str())
    );
}

#[tokio::test]
async fn test_close_then_reconnect() {
    let first = remote();
    let second = remote();
    let connector = ScriptedConnector::new([
        Outcome::Connect(first.clone()),
        Outcome::Connect(second.clone()),
    ]);
    let storage = SftpStorage::new(config())
        .unwrap()
        .with_connector(connector.clone());

    storage.exists("a").await.unwrap();
    assert!(storage.is_connected().await);
    storage.close().await.unwrap();
    assert!(first.is_closed());
    assert!(!storage.is_connected().await);

    // Closing twice is harmless.
    storage.close().await.unwrap();

    storage.exists("a").await.unwrap();
    assert_eq!(connector.calls(), 2);
    assert!(!second.is_closed());
}
