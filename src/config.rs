//! Mount configuration.
//!
//! [`MountConfig`] collects everything that changes how the tree is presented
//! to the kernel. It is normally built from the command line with
//! [`Cli::mount_config`](crate::Cli::mount_config).

use std::time::Duration;

/// Read and execute for owner, group and others
pub const READ_EXECUTE_MODE: u32 = 0o555;

/// How file permission bits are derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Ignore what the archive stores and report `0o555`, so every member is
    /// readable no matter how the archive was authored.
    #[default]
    ReadExecute,

    /// Report the archive's stored bits with all write bits cleared
    Archive,
}

impl PermissionPolicy {
    /// Mode for a file whose archive records `hint`
    pub fn file_mode(&self, hint: u32) -> u32 {
        match self {
            PermissionPolicy::ReadExecute => READ_EXECUTE_MODE,
            PermissionPolicy::Archive => hint & READ_EXECUTE_MODE,
        }
    }
}

/// Options controlling how an archive is mounted
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Filesystem name shown in the mount table
    pub fs_name: String,
    /// Permission policy for files
    pub permissions: PermissionPolicy,
    /// How long the kernel may cache attributes and lookups.
    /// Content never changes, so this can be long.
    pub attr_ttl: Duration,
    /// Allow users other than the mounter to access the mount
    pub allow_other: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: "zipmount".to_string(),
            permissions: PermissionPolicy::default(),
            attr_ttl: Duration::from_secs(86400),
            allow_other: false,
        }
    }
}

impl MountConfig {
    pub fn with_fs_name(mut self, fs_name: impl Into<String>) -> Self {
        self.fs_name = fs_name.into();
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionPolicy) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_attr_ttl(mut self, attr_ttl: Duration) -> Self {
        self.attr_ttl = attr_ttl;
        self
    }

    pub fn with_allow_other(mut self, allow_other: bool) -> Self {
        self.allow_other = allow_other;
        self
    }
}
