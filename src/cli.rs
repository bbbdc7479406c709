use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{MountConfig, PermissionPolicy};
use crate::fs::root_name;

#[derive(Parser, Debug)]
#[command(name = "zipmount")]
#[command(version)]
#[command(about = "Mount a local or remote ZIP archive as a read-only filesystem", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipmount data.zip /mnt/data                        mount a local archive\n  \
  zipmount https://example.com/big.zip /mnt/big      mount a remote archive via Range requests\n  \
  zipmount -l https://example.com/big.zip            print the tree without mounting")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Directory to mount on
    #[arg(value_name = "MOUNTPOINT", required_unless_present = "list")]
    pub mountpoint: Option<PathBuf>,

    /// List the tree and exit without mounting
    #[arg(short = 'l')]
    pub list: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Less logging (-q warnings, -qq errors only)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Allow other users to access the mount
    #[arg(long)]
    pub allow_other: bool,

    /// Report the archive's stored permissions (write bits cleared) instead of 0555
    #[arg(long)]
    pub archive_modes: bool,

    /// Kernel attribute and lookup cache lifetime, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 86400)]
    pub ttl: u64,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }

    /// Display name of the tree root and the mounted filesystem
    pub fn display_name(&self) -> String {
        root_name(&self.archive)
    }

    pub fn mount_config(&self) -> MountConfig {
        let permissions = if self.archive_modes {
            PermissionPolicy::Archive
        } else {
            PermissionPolicy::ReadExecute
        };

        MountConfig::default()
            .with_fs_name(self.display_name())
            .with_permissions(permissions)
            .with_attr_ttl(Duration::from_secs(self.ttl))
            .with_allow_other(self.allow_other)
    }
}
