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

use common::{config, remote, storage_on, Outcome, ScriptedConnector};
use sftpstore::storage::memory::FsOp;
use sftpstore::{Error, FileState, OpenMode, SftpStorage, Storage};

#[tokio::test]
async fn test_unread_handle_transfers_nothing() {
    let connector = ScriptedConnector::new([Outcome::Connect(remote())]);
    let storage = SftpStorage::new(config())
        .unwrap()
        .with_connector(connector.clone());

    let mut file = storage.open("a.txt", OpenMode::READ);
    assert_eq!(file.state(), FileState::Fresh);
    file.close().await.unwrap();

    assert_eq!(file.state(), FileState::Closed);
    assert_eq!(connector.calls(), 0);
}

#[tokio::test]
async fn test_read_materializes_once() {
    let fs = remote();
    fs.insert_file("/srv/files/a.txt", "0123456789");
    let storage = storage_on(&fs, config());

    let mut file = storage.open("a.txt", "rb".parse().unwrap());
    assert_eq!(file.read(Some(4)).await.unwrap(), b"0123");
    assert_eq!(file.state(), FileState::Materialized);
    assert_eq!(file.read(None).await.unwrap(), b"456789");
    assert!(file.read(Some(4)).await.unwrap().is_empty());

    let downloads = fs
        .ops()
        .iter()
        .filter(|op| matches!(op, FsOp::OpenRead(_)))
        .count();
    assert_eq!(downloads, 1);

    file.close().await.unwrap();
    assert!(!fs.ops().iter().any(FsOp::is_mutation));
}

#[tokio::test]
async fn test_read_missing_file_fails() {
    let fs = remote();
    let storage = storage_on(&fs, config());

    let mut file = storage.open("missing.txt", OpenMode::READ);
    let err = file.read(None).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(file.state(), FileState::Fresh);
}

#[tokio::test]
async fn test_write_is_saved_on_close() {
    let fs = remote();
    let storage = storage_on(&fs, config());

    let mut file = storage.open("out/report.txt", "wb".parse().unwrap());
    file.write(b"first").unwrap();
    file.write(b"second").unwrap();
    assert!(file.is_dirty());
    assert_eq!(file.state(), FileState::Materialized);
    assert!(fs.ops().is_empty());

    file.close().await.unwrap();
    assert!(!file.is_dirty());
    assert_eq!(
        fs.file("/srv/files/out/report.txt").as_deref(),
        Some(&b"second"[..])
    );
}

#[tokio::test]
async fn test_read_write_handle() {
    let fs = remote();
    fs.insert_file("/srv/files/counter", "1");
    let storage = storage_on(&fs, config());

    let mut file = storage.open("counter", OpenMode::READ_WRITE);
    let current = file.read(None).await.unwrap();
    assert_eq!(current, b"1");
    file.write(b"2").unwrap();
    file.close().await.unwrap();

    assert_eq!(fs.file("/srv/files/counter").as_deref(), Some(&b"2"[..]));
}

#[tokio::test]
async fn test_mode_violations() {
    let fs = remote();
    fs.insert_file("/srv/files/a.txt", "a");
    let storage = storage_on(&fs, config());

    let mut reader = storage.open("a.txt", OpenMode::READ);
    assert!(matches!(
        reader.write(b"nope"),
        Err(Error::InvalidOperation(_))
    ));

    let mut writer = storage.open("a.txt", OpenMode::WRITE);
    assert!(matches!(
        writer.read(None).await,
        Err(Error::InvalidOperation(_))
    ));
    assert!(fs.ops().is_empty());
}

#[tokio::test]
async fn test_closed_handle_rejects_operations() {
    let fs = remote();
    fs.insert_file("/srv/files/a.txt", "a");
    let storage = storage_on(&fs, config());

    let mut file = storage.open("a.txt", OpenMode::READ_WRITE);
    file.close().await.unwrap();
    file.close().await.unwrap();

    assert!(matches!(file.read(None).await, Err(Error::InvalidOperation(_))));
    assert!(matches!(file.write(b"x"), Err(Error::InvalidOperation(_))));
    assert!(matches!(file.size().await, Err(Error::InvalidOperation(_))));
}

#[tokio::test]
async fn test_size_is_cached() {
    let fs = remote();
    fs.insert_file("/srv/files/a.txt", "abc");
    let storage = storage_on(&fs, config());

    let mut file = storage.open("a.txt", OpenMode::READ);
    assert_eq!(file.size().await.unwrap(), 3);
    fs.insert_file("/srv/files/a.txt", "abcdef");
    assert_eq!(file.size().await.unwrap(), 3);

    let stats = fs
        .ops()
        .iter()
        .filter(|op| matches!(op, FsOp::Stat(_)))
        .count();
    assert_eq!(stats, 1);
}

#[tokio::test]
async fn test_failed_save_keeps_handle_open() {
    let fs = remote();
    let storage = storage_on(&fs, config());
    storage.session().await.unwrap();

    let mut file = storage.open("retry.txt", OpenMode::WRITE);
    file.write(b"payload").unwrap();

    fs.set_disconnected(true);
    let err = file.close().await.unwrap_err();
    assert!(err.is_connection_error());
    assert!(file.is_dirty());
    assert_eq!(file.state(), FileState::Materialized);

    fs.set_disconnected(false);
    file.close().await.unwrap();
    assert_eq!(file.state(), FileState::Closed);
    assert_eq!(fs.file("/srv/files/retry.txt").as_deref(), Some(&b"payload"[..]));
}
