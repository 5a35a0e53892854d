//! Copy specification models and top-level error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Base names skipped by default: VCS metadata, IDE metadata and build output.
pub const NAMES_IGNORE_DEFAULT: [&str; 4] = [".git", ".idea", ".gitignore", "target"];

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Symlink handling policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnumCopySymlinkStrategy {
    /// Follow the link and copy the target bytes/entries.
    ///
    /// A directory already entered once (same device and inode) is skipped
    /// with a warning, so link cycles terminate.
    #[default]
    Dereference,
    /// Create a symbolic link at destination; the link target text goes
    /// through symbol substitution like any other path.
    CopySymlinks,
    /// Ignore symlink entries.
    SkipSymlinks,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Input options for `copy_tree`.
#[derive(Debug, Clone)]
pub struct SpecCopyOptions {
    /// Exact base names skipped together with their whole subtree.
    pub names_ignore: Vec<String>,
    /// Extra glob patterns applied to base names, same effect as `names_ignore`.
    pub patterns_ignore_extra: Option<Vec<String>>,
    /// Symlink handling behavior.
    pub rule_symlink: EnumCopySymlinkStrategy,
    /// Copy permission bits (and on Linux times + xattrs) onto written files.
    pub if_preserve_metadata: bool,
    /// Do not mutate filesystem; log and count what would happen.
    pub if_dry_run: bool,
}

impl Default for SpecCopyOptions {
    fn default() -> Self {
        Self {
            names_ignore: NAMES_IGNORE_DEFAULT.iter().map(|v| v.to_string()).collect(),
            patterns_ignore_extra: None,
            rule_symlink: EnumCopySymlinkStrategy::Dereference,
            if_preserve_metadata: true,
            if_dry_run: false,
        }
    }
}

/// Errors that abort a copy. The destination tree is left as-is.
#[derive(Debug, Error)]
pub enum CopyTreeError {
    /// Invalid ignore pattern or uncompilable rename table.
    #[error("{0}")]
    InvalidPattern(String),
    /// Source path does not exist or is not a directory.
    #[error("invalid source: {}", .0.display())]
    SourceNotDirectory(PathBuf),
    /// Destination root already exists.
    #[error("existing destination: {}", .0.display())]
    DestinationExists(PathBuf),
    /// Source and destination overlap (`src` contains `dst` or vice versa).
    #[error(
        "Source and destination directories overlap: {} <-> {}",
        source_dir.display(),
        destination_dir.display()
    )]
    SourceDestinationOverlap {
        /// Normalized source directory.
        source_dir: PathBuf,
        /// Normalized destination directory.
        destination_dir: PathBuf,
    },
    /// A target path exists already, or was already produced by this run.
    #[error("Destination collision: {}", path.display())]
    DestinationCollision {
        /// Destination path that would have been written twice.
        path: PathBuf,
    },
    /// Substitution produced a path leaving the destination root.
    #[error("Unsafe destination path escapes destination root: {}", path.display())]
    UnsafeDestination {
        /// Offending relative path after substitution.
        path: PathBuf,
    },
    /// Followed symlink points nowhere.
    #[error("Broken symlink: {}", path.display())]
    BrokenSymlink {
        /// Source link path.
        path: PathBuf,
    },
    /// Any other read/write failure.
    #[error("IO exception: {}", path.display())]
    Io {
        /// Source or destination path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl CopyTreeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
