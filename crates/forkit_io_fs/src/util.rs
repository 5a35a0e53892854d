use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::rename::CombinedPattern;
use crate::spec::CopyTreeError;

////////////////////////////////////////////////////////////////////////////////
// #region IgnoreSet

/// Base names (exact and glob) excluded from the walk together with their subtree.
#[derive(Debug, Clone)]
pub(crate) struct SpecIgnoreSet {
    names_exact: Vec<String>,
    globs_extra: Option<GlobSet>,
}

impl SpecIgnoreSet {
    pub(crate) fn from_raw(
        names_ignore: &[String],
        patterns_ignore_extra: Option<&[String]>,
    ) -> Result<Self, CopyTreeError> {
        let globs_extra = match patterns_ignore_extra {
            None => None,
            Some([]) => None,
            Some(patterns) => {
                let mut builder = GlobSetBuilder::new();
                for pattern in patterns {
                    let glob = Glob::new(pattern).map_err(|e| {
                        CopyTreeError::InvalidPattern(format!("Invalid ignore pattern: {e}"))
                    })?;
                    builder.add(glob);
                }
                Some(builder.build().map_err(|e| {
                    CopyTreeError::InvalidPattern(format!("Invalid ignore pattern: {e}"))
                })?)
            }
        };
        Ok(Self {
            names_exact: names_ignore.to_vec(),
            globs_extra,
        })
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.names_exact.iter().any(|v| v == name)
            || self
                .globs_extra
                .as_ref()
                .is_some_and(|globs| globs.is_match(name))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _absolutize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

/// Canonicalize the longest existing ancestor and re-append the missing tail.
fn _normalize_path(path: &Path) -> PathBuf {
    let path_abs = _absolutize_path(path);
    let mut l_tail = Vec::new();
    let mut path_cursor = path_abs.as_path();
    loop {
        if let Ok(resolved) = fs::canonicalize(path_cursor) {
            let mut path_out = resolved;
            for part in l_tail.iter().rev() {
                path_out.push(part);
            }
            return path_out;
        }
        match (path_cursor.file_name(), path_cursor.parent()) {
            (Some(name), Some(parent)) => {
                l_tail.push(name.to_os_string());
                path_cursor = parent;
            }
            _ => return path_abs,
        }
    }
}

pub(crate) fn is_overlap(src: &Path, dst: &Path) -> bool {
    let src_resolved = _normalize_path(src);
    let dst_resolved = _normalize_path(dst);
    dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved)
}

/// Relative destination path derived from one source relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpecRewrittenPath {
    pub(crate) path_rel: PathBuf,
    pub(crate) if_renamed: bool,
    pub(crate) if_lossy: bool,
}

/// Apply symbol substitution to a whole relative path string.
///
/// Separators are non-word characters, so every segment is rewritten on its
/// own unless a symbol itself spans a separator. A path that is not valid
/// UTF-8 is rewritten segment by segment instead: the non-UTF-8 segments stay
/// as they are and `if_lossy` is set.
pub(crate) fn rewrite_relative_path(
    path_rel: &Path,
    pattern: &CombinedPattern,
) -> Result<SpecRewrittenPath, CopyTreeError> {
    let (path_new, if_lossy) = match path_rel.to_str() {
        Some(c_path_rel) => (PathBuf::from(pattern.sed(c_path_rel).into_owned()), false),
        None => (rewrite_components(path_rel, pattern), true),
    };

    let b_is_safe = path_new
        .components()
        .all(|part| matches!(part, Component::Normal(_) | Component::CurDir));
    if !b_is_safe || (path_new.as_os_str().is_empty() && !path_rel.as_os_str().is_empty()) {
        return Err(CopyTreeError::UnsafeDestination { path: path_new });
    }

    Ok(SpecRewrittenPath {
        if_renamed: path_new.as_path() != path_rel,
        path_rel: path_new,
        if_lossy,
    })
}

fn rewrite_components(path_rel: &Path, pattern: &CombinedPattern) -> PathBuf {
    let mut path_new = PathBuf::new();
    for part in path_rel.components() {
        let os_part = part.as_os_str();
        match os_part.to_str() {
            Some(c_part) => path_new.push(&*pattern.sed(c_part)),
            None => path_new.push(os_part),
        }
    }
    path_new
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FileOps

/// Stream `path_file_src` into a new file at `path_file_dst`, one line at a time.
///
/// Lines keep their terminator, so newline structure survives byte for byte.
/// The destination is opened with `create_new`; an existing file is a
/// [`CopyTreeError::DestinationCollision`]. Returns the number of symbol
/// replacements.
pub(crate) fn copy_file_with_substitution(
    path_file_src: &Path,
    path_file_dst: &Path,
    pattern: &CombinedPattern,
) -> Result<u64, CopyTreeError> {
    let file_src =
        fs::File::open(path_file_src).map_err(|e| CopyTreeError::io(path_file_src, e))?;
    let file_dst = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path_file_dst)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => CopyTreeError::DestinationCollision {
                path: path_file_dst.to_path_buf(),
            },
            _ => CopyTreeError::io(path_file_dst, e),
        })?;
    let mut reader = BufReader::new(file_src);
    let mut writer = BufWriter::new(file_dst);

    let mut n_replaced = 0_u64;
    let mut buf_line = Vec::new();
    loop {
        buf_line.clear();
        let n_read = reader
            .read_until(b'\n', &mut buf_line)
            .map_err(|e| CopyTreeError::io(path_file_src, e))?;
        if n_read == 0 {
            break;
        }
        let (line_new, n_line) = pattern.sed_bytes(&buf_line);
        writer
            .write_all(&line_new)
            .map_err(|e| CopyTreeError::io(path_file_dst, e))?;
        n_replaced += n_line;
    }
    writer
        .flush()
        .map_err(|e| CopyTreeError::io(path_file_dst, e))?;
    Ok(n_replaced)
}

pub(crate) fn copy_metadata(path_file_src: &Path, path_file_dst: &Path) -> Result<(), io::Error> {
    let stat_src = fs::metadata(path_file_src)?;
    fs::set_permissions(path_file_dst, stat_src.permissions())?;
    #[cfg(target_os = "linux")]
    {
        apply_metadata_linux(&stat_src, path_file_src, path_file_dst)?;
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn apply_metadata_linux(
    stat_src: &fs::Metadata,
    path_file_src: &Path,
    path_file_dst: &Path,
) -> Result<(), io::Error> {
    use filetime::{FileTime, set_file_times};

    let file_time_access = FileTime::from_last_access_time(stat_src);
    let file_time_modify = FileTime::from_last_modification_time(stat_src);
    set_file_times(path_file_dst, file_time_access, file_time_modify)?;

    copy_xattrs_linux(path_file_src, path_file_dst);
    Ok(())
}

#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let iter_xattr_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(_) => return,
    };

    for name in iter_xattr_names {
        let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() else {
            continue;
        };
        let _ = xattr::set(path_file_dst, &name, &raw_value);
    }
}

pub(crate) fn create_symbolic_link(
    path_link_target: &Path,
    path_dst: &Path,
    if_target_is_dir: bool,
) -> Result<(), io::Error> {
    #[cfg(unix)]
    {
        let _ = if_target_is_dir;
        std::os::unix::fs::symlink(path_link_target, path_dst)
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};
        if if_target_is_dir {
            symlink_dir(path_link_target, path_dst)
        } else {
            symlink_file(path_link_target, path_dst)
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (path_link_target, path_dst, if_target_is_dir);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Symbolic links are unsupported on this platform",
        ))
    }
}

/// (device, inode) of a directory, used for symlink loop detection.
#[cfg(unix)]
pub(crate) fn dir_identity(stat_dir: &fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((stat_dir.dev(), stat_dir.ino()))
}

#[cfg(not(unix))]
pub(crate) fn dir_identity(_stat_dir: &fs::Metadata) -> Option<(u64, u64)> {
    None
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
