//! `forkit_io_fs`:
//! Rust-side project fork engine: copy a directory tree while renaming symbols
//! in paths and file content.
//!
//! Modules:
//! - `rename` : rename table, combined symbol pattern, substitution
//! - `copy`   : traversal and copy orchestration
//! - `spec`   : enums/options/errors
//! - `report` : run-time report model
//! - `util`   : shared helper functions

pub mod copy;
pub mod rename;
pub mod report;
pub mod spec;
mod util;

pub use copy::{copy, copy_tree};
pub use rename::{CombinedPattern, RenameTable};
pub use report::{ReportCopy, ReportCopyBuilder};
pub use spec::{CopyTreeError, EnumCopySymlinkStrategy, NAMES_IGNORE_DEFAULT, SpecCopyOptions};
