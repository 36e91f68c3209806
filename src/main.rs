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


use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use sftpstore::{
    cli::{Cli, Commands},
    storage::{SftpStorage, Storage},
    utils::{format_bytes, init_logging},
    StorageConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = StorageConfig::load_with_priority(cli.config.as_deref())
        .await
        .context("Failed to load storage configuration")?;
    if cli.interactive {
        config.interactive = true;
    }

    let storage = SftpStorage::new(config).context("Invalid storage configuration")?;
    let result = run(&storage, cli.command).await;

    if let Err(e) = storage.close().await {
        tracing::warn!("Failed to close SFTP session cleanly: {}", e);
    }

    match result? {
        true => Ok(()),
        false => std::process::exit(1),
    }
}

/// Run one subcommand. Returns `false` when the process should exit with 1.
async fn run(storage: &SftpStorage, command: Commands) -> Result<bool> {
    match command {
        Commands::Put { local, name } => {
            let name = match name {
                Some(name) => name,
                None => default_name(&local)?,
            };
            let mut file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("Failed to open {local:?}"))?;
            let stored = storage
                .save(&name, &mut file)
                .await
                .with_context(|| format!("Failed to upload {local:?}"))?;
            let size = storage.size(&stored).await?;
            println!("{stored} ({})", format_bytes(size));
        }
        Commands::Get { name, local } => {
            let mut stream = storage
                .read(&name)
                .await
                .with_context(|| format!("Failed to download {name}"))?;
            match local {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {path:?}"))?;
                    let copied = tokio::io::copy(&mut stream, &mut file).await?;
                    file.flush().await?;
                    tracing::info!("Wrote {} to {:?}", format_bytes(copied), path);
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut stream, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
        }
        Commands::Rm { name } => {
            storage
                .delete(&name)
                .await
                .with_context(|| format!("Failed to delete {name}"))?;
        }
        Commands::Ls { dir } => {
            let (dirs, files) = storage
                .listdir(&dir)
                .await
                .with_context(|| format!("Failed to list {dir:?}"))?;
            for d in dirs {
                println!("{d}/");
            }
            for f in files {
                println!("{f}");
            }
        }
        Commands::Stat { name } => {
            let size = storage.size(&name).await?;
            let accessed = storage.accessed_time(&name).await?;
            let modified = storage.modified_time(&name).await?;
            println!("Name:     {name}");
            println!("Path:     {}", storage.remote_path(&name));
            println!("Size:     {} ({size} bytes)", format_bytes(size));
            println!("Accessed: {}", accessed.to_rfc3339());
            println!("Modified: {}", modified.to_rfc3339());
        }
        Commands::Exists { name } => {
            let exists = storage.exists(&name).await?;
            println!("{exists}");
            return Ok(exists);
        }
        Commands::Url { name } => {
            println!("{}", storage.url(&name)?);
        }
    }
    Ok(true)
}

fn default_name(local: &Path) -> Result<String> {
    local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Cannot derive a storage name from {local:?}"))
}
