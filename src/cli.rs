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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sftpstore",
    version,
    about = "Store and fetch files on a remote host over SFTP",
    long_about = "sftpstore keeps files under a root directory on a remote host, reached over a single SSH/SFTP session.\nNames are relative to the configured root; missing directories are created on upload with the\nconfigured permissions and ownership. Authentication uses configured key files, the SSH agent,\ndefault keys in ~/.ssh and finally a password.",
    after_help = "EXAMPLES:\n  Upload a file:             sftpstore put ./report.pdf reports/2025/report.pdf\n  Download to stdout:        sftpstore get reports/2025/report.pdf\n  List a directory:          sftpstore ls reports\n  Public URL of a name:      sftpstore url reports/2025/report.pdf\n\nConfiguration is read from --config, else from SFTP_STORAGE_* environment variables,\nelse from the platform config directory (e.g. ~/.config/sftpstore/config.yaml)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        env = "SFTPSTORE_CONFIG",
        help = "Configuration file path (YAML)\nConfig loading priority:\n  1. This flag\n  2. SFTP_STORAGE_HOST / SFTP_STORAGE_ROOT and related environment variables\n  3. User config (~/.config/sftpstore/config.yaml)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        help = "Prompt for a password if authentication fails and none is configured"
    )]
    pub interactive: bool,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Upload a local file under a storage name")]
    Put {
        #[arg(help = "Local file to upload")]
        local: PathBuf,
        #[arg(help = "Storage name to save as (defaults to the file name)")]
        name: Option<String>,
    },

    #[command(about = "Download a stored file to a local path or stdout")]
    Get {
        #[arg(help = "Storage name to download")]
        name: String,
        #[arg(help = "Local destination; writes to stdout when omitted")]
        local: Option<PathBuf>,
    },

    #[command(about = "Delete a stored file")]
    Rm {
        #[arg(help = "Storage name to delete")]
        name: String,
    },

    #[command(about = "List directories and files under a storage directory")]
    Ls {
        #[arg(default_value = "", help = "Storage directory (defaults to the root)")]
        dir: String,
    },

    #[command(about = "Show size and timestamps of a stored file")]
    Stat {
        #[arg(help = "Storage name")]
        name: String,
    },

    #[command(
        about = "Check whether a name exists",
        long_about = "Prints 'true' or 'false'.\n\nExit codes: 0 (exists), 1 (does not exist)"
    )]
    Exists {
        #[arg(help = "Storage name")]
        name: String,
    },

    #[command(about = "Print the public URL of a name")]
    Url {
        #[arg(help = "Storage name")]
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_put() {
        let cli = Cli::try_parse_from([
            "sftpstore",
            "-vv",
            "--config",
            "/etc/sftpstore.yaml",
            "put",
            "./a.txt",
            "docs/a.txt",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sftpstore.yaml")));
        match cli.command {
            Commands::Put { local, name } => {
                assert_eq!(local, PathBuf::from("./a.txt"));
                assert_eq!(name.as_deref(), Some("docs/a.txt"));
            }
            other => panic!("Expected put, got {other:?}"),
        }
    }

    #[test]
    fn test_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["sftpstore", "ls"]).unwrap();
        match cli.command {
            Commands::Ls { dir } => assert_eq!(dir, ""),
            other => panic!("Expected ls, got {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["sftpstore"]).is_err());
    }
}
