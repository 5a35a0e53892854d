//! Filesystem tree traversal, renaming and copy orchestration.

use std::collections::HashSet;
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::rename::{CombinedPattern, RenameTable};
use crate::report::{ReportCopy, ReportCopyBuilder};
use crate::spec::{CopyTreeError, EnumCopySymlinkStrategy, SpecCopyOptions};
use crate::util::{
    SpecIgnoreSet, copy_file_with_substitution, copy_metadata, create_symbolic_link,
    dir_identity, is_overlap, rewrite_relative_path,
};

/// One directory entry met during the walk, classified once.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TraversalNode {
    Directory(PathBuf),
    File(PathBuf),
    /// Link recreated as a link (`CopySymlinks`).
    Symlink {
        path_src: PathBuf,
        if_target_is_dir: bool,
    },
    /// Excluded by the ignore set or the symlink policy; subtree included.
    Ignored(PathBuf),
    /// FIFO, socket, device node.
    Special(PathBuf),
}

impl TraversalNode {
    fn path(&self) -> &Path {
        match self {
            Self::Directory(path)
            | Self::File(path)
            | Self::Ignored(path)
            | Self::Special(path) => path,
            Self::Symlink { path_src, .. } => path_src,
        }
    }
}

#[derive(Debug)]
struct SpecCopyContext {
    path_dir_src: PathBuf,
    path_dir_dst: PathBuf,
    spec_cp_options: SpecCopyOptions,
    pattern: CombinedPattern,
    set_ignore: SpecIgnoreSet,
    builder_cp_report: ReportCopyBuilder,
    set_ancestor_dirs: HashSet<(u64, u64)>,
    set_paths_written: HashSet<PathBuf>,
}

/// Copy a project tree from `dir_source` to `dir_destination`, renaming symbols.
///
/// Every relative path and every content line goes through one substitution
/// pass built from `table`. Entries whose base name is in the ignore set are
/// skipped with their subtree. `dir_destination` must not exist; its missing
/// parents are created.
///
/// The walk is depth-first and sorted by name: a directory is created before
/// anything inside it, subdirectories are handled before sibling files.
///
/// The first error aborts the run and is returned; whatever was written so far
/// stays on disk.
pub fn copy_tree<P, Q>(
    dir_source: P,
    dir_destination: Q,
    table: &RenameTable,
    spec_cp_options: SpecCopyOptions,
) -> Result<ReportCopy, CopyTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let path_dir_src = dir_source.as_ref().to_path_buf();
    let path_dir_dst = dir_destination.as_ref().to_path_buf();

    if !path_dir_src.is_dir() {
        return Err(CopyTreeError::SourceNotDirectory(path_dir_src));
    }
    if fs::symlink_metadata(&path_dir_dst).is_ok() {
        return Err(CopyTreeError::DestinationExists(path_dir_dst));
    }
    if is_overlap(&path_dir_src, &path_dir_dst) {
        return Err(CopyTreeError::SourceDestinationOverlap {
            source_dir: path_dir_src,
            destination_dir: path_dir_dst,
        });
    }

    let pattern = CombinedPattern::compile(table)?;
    let set_ignore = SpecIgnoreSet::from_raw(
        &spec_cp_options.names_ignore,
        spec_cp_options.patterns_ignore_extra.as_deref(),
    )?;

    let mut spec_cp_ctx = SpecCopyContext {
        path_dir_src: path_dir_src.clone(),
        path_dir_dst,
        spec_cp_options,
        pattern,
        set_ignore,
        builder_cp_report: ReportCopyBuilder::default(),
        set_ancestor_dirs: HashSet::new(),
        set_paths_written: HashSet::new(),
    };

    create_destination_root(&mut spec_cp_ctx)?;
    if let Some(tuple_dir_identifier) = directory_identity(&path_dir_src, &spec_cp_ctx)? {
        spec_cp_ctx.set_ancestor_dirs.insert(tuple_dir_identifier);
    }
    walk_directory(&path_dir_src, &mut spec_cp_ctx)?;
    Ok(spec_cp_ctx.builder_cp_report.build())
}

/// Copy with default options and report only success or failure.
///
/// Failures are logged at error level instead of being returned.
pub fn copy<P, Q>(dir_source: P, dir_destination: Q, table: &RenameTable) -> bool
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    match copy_tree(
        dir_source,
        dir_destination,
        table,
        SpecCopyOptions::default(),
    ) {
        Ok(report) => {
            info!("{report}");
            true
        }
        Err(e) => {
            error!("{}", format_error_chain(&e));
            false
        }
    }
}

/// `outer: cause: root cause`, one segment per error in the source chain.
fn format_error_chain(err: &dyn Error) -> String {
    let mut c_msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        c_msg.push_str(": ");
        c_msg.push_str(&cause.to_string());
        source = cause.source();
    }
    c_msg
}

fn create_destination_root(spec_cp_ctx: &mut SpecCopyContext) -> Result<(), CopyTreeError> {
    let path_dir_dst = spec_cp_ctx.path_dir_dst.clone();
    spec_cp_ctx.builder_cp_report.add_scanned();
    spec_cp_ctx.set_paths_written.insert(path_dir_dst.clone());

    debug!(
        "preVisitDirectory({}, {})",
        spec_cp_ctx.path_dir_src.display(),
        path_dir_dst.display()
    );
    if spec_cp_ctx.spec_cp_options.if_dry_run {
        info!("[dry-run] mkdir {}", path_dir_dst.display());
    } else {
        if let Some(path_parent_dst) = path_dir_dst.parent()
            && !path_parent_dst.as_os_str().is_empty()
        {
            fs::create_dir_all(path_parent_dst)
                .map_err(|e| CopyTreeError::io(path_parent_dst, e))?;
        }
        create_single_dir(&path_dir_dst)?;
    }
    spec_cp_ctx.builder_cp_report.add_dir_created();
    Ok(())
}

/// (device, inode) of a directory about to be entered through followed links.
///
/// `None` when links are not followed or the platform has no inode identity.
fn directory_identity(
    path_dir: &Path,
    spec_cp_ctx: &SpecCopyContext,
) -> Result<Option<(u64, u64)>, CopyTreeError> {
    if spec_cp_ctx.spec_cp_options.rule_symlink != EnumCopySymlinkStrategy::Dereference {
        return Ok(None);
    }
    let stat_dir = fs::metadata(path_dir).map_err(|e| CopyTreeError::io(path_dir, e))?;
    Ok(dir_identity(&stat_dir))
}

fn create_single_dir(path_dir_dst: &Path) -> Result<(), CopyTreeError> {
    fs::create_dir(path_dir_dst).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => CopyTreeError::DestinationCollision {
            path: path_dir_dst.to_path_buf(),
        },
        _ => CopyTreeError::io(path_dir_dst, e),
    })
}

fn walk_directory(
    path_root: &Path,
    spec_cp_ctx: &mut SpecCopyContext,
) -> Result<(), CopyTreeError> {
    let mut l_dirs: Vec<TraversalNode> = Vec::new();
    let mut l_files: Vec<TraversalNode> = Vec::new();

    let iter_entries = fs::read_dir(path_root).map_err(|e| CopyTreeError::io(path_root, e))?;
    for entry_res in iter_entries {
        let entry = entry_res.map_err(|e| CopyTreeError::io(path_root, e))?;
        let node = classify_entry(&entry, spec_cp_ctx)?;
        match node {
            TraversalNode::Directory(_) => l_dirs.push(node),
            _ => l_files.push(node),
        }
    }

    l_dirs.sort_by(|a, b| a.path().cmp(b.path()));
    l_files.sort_by(|a, b| a.path().cmp(b.path()));

    for node in l_dirs.into_iter().chain(l_files) {
        spec_cp_ctx.builder_cp_report.add_scanned();
        match node {
            TraversalNode::Directory(path_dir_src_sub) => {
                descend_directory(&path_dir_src_sub, spec_cp_ctx)?;
            }
            TraversalNode::File(path_file_src) => {
                handle_file_entry(&path_file_src, spec_cp_ctx)?;
            }
            TraversalNode::Symlink {
                path_src,
                if_target_is_dir,
            } => {
                handle_symlink_entry(&path_src, if_target_is_dir, spec_cp_ctx)?;
            }
            TraversalNode::Ignored(path_src) => {
                debug!("skip {}", path_src.display());
                spec_cp_ctx.builder_cp_report.add_ignored();
            }
            TraversalNode::Special(path_src) => {
                spec_cp_ctx
                    .builder_cp_report
                    .add_warning(format!("Special file skipped: {}", path_src.display()));
                spec_cp_ctx.builder_cp_report.add_ignored();
            }
        }
    }
    Ok(())
}

fn classify_entry(
    entry: &fs::DirEntry,
    spec_cp_ctx: &SpecCopyContext,
) -> Result<TraversalNode, CopyTreeError> {
    let path_entry = entry.path();
    let c_name = entry.file_name().to_string_lossy().to_string();
    if spec_cp_ctx.set_ignore.contains(&c_name) {
        return Ok(TraversalNode::Ignored(path_entry));
    }

    let cfg_file_type = entry
        .file_type()
        .map_err(|e| CopyTreeError::io(&path_entry, e))?;
    if !cfg_file_type.is_symlink() {
        return Ok(if cfg_file_type.is_dir() {
            TraversalNode::Directory(path_entry)
        } else if cfg_file_type.is_file() {
            TraversalNode::File(path_entry)
        } else {
            TraversalNode::Special(path_entry)
        });
    }

    match spec_cp_ctx.spec_cp_options.rule_symlink {
        EnumCopySymlinkStrategy::SkipSymlinks => Ok(TraversalNode::Ignored(path_entry)),
        EnumCopySymlinkStrategy::CopySymlinks => Ok(TraversalNode::Symlink {
            if_target_is_dir: path_entry.is_dir(),
            path_src: path_entry,
        }),
        EnumCopySymlinkStrategy::Dereference => match fs::metadata(&path_entry) {
            Ok(stat_target) if stat_target.is_dir() => Ok(TraversalNode::Directory(path_entry)),
            Ok(stat_target) if stat_target.is_file() => Ok(TraversalNode::File(path_entry)),
            Ok(_) => Ok(TraversalNode::Special(path_entry)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(CopyTreeError::BrokenSymlink { path: path_entry })
            }
            Err(e) => Err(CopyTreeError::io(path_entry, e)),
        },
    }
}

/// Map a source path onto the destination tree and claim the target path.
fn resolve_destination(
    path_src: &Path,
    spec_cp_ctx: &mut SpecCopyContext,
) -> Result<PathBuf, CopyTreeError> {
    let path_rel = path_src
        .strip_prefix(&spec_cp_ctx.path_dir_src)
        .map_err(|_| CopyTreeError::UnsafeDestination {
            path: path_src.to_path_buf(),
        })?;
    let rewritten = rewrite_relative_path(path_rel, &spec_cp_ctx.pattern)?;
    if rewritten.if_lossy {
        spec_cp_ctx.builder_cp_report.add_warning(format!(
            "Non UTF-8 path copied without renaming: {}",
            path_src.display()
        ));
    }
    if rewritten.if_renamed {
        spec_cp_ctx.builder_cp_report.add_renamed();
    }

    let path_dst = spec_cp_ctx.path_dir_dst.join(&rewritten.path_rel);
    if fs::symlink_metadata(&path_dst).is_ok()
        || !spec_cp_ctx.set_paths_written.insert(path_dst.clone())
    {
        return Err(CopyTreeError::DestinationCollision { path: path_dst });
    }
    Ok(path_dst)
}

/// Create the destination of one source directory, then walk into it.
///
/// A followed link leading back to one of its own ancestors is a loop: it is
/// skipped with a warning and nothing is created for it.
fn descend_directory(
    path_dir_src_sub: &Path,
    spec_cp_ctx: &mut SpecCopyContext,
) -> Result<(), CopyTreeError> {
    let tuple_dir_identifier = directory_identity(path_dir_src_sub, spec_cp_ctx)?;
    if let Some(v) = tuple_dir_identifier
        && spec_cp_ctx.set_ancestor_dirs.contains(&v)
    {
        spec_cp_ctx.builder_cp_report.add_warning(format!(
            "Symlink loop detected: {}",
            path_dir_src_sub.display()
        ));
        spec_cp_ctx.builder_cp_report.add_ignored();
        return Ok(());
    }

    handle_dir_entry(path_dir_src_sub, spec_cp_ctx)?;
    if let Some(v) = tuple_dir_identifier {
        spec_cp_ctx.set_ancestor_dirs.insert(v);
    }
    let res_walk = walk_directory(path_dir_src_sub, spec_cp_ctx);
    if let Some(v) = tuple_dir_identifier {
        spec_cp_ctx.set_ancestor_dirs.remove(&v);
    }
    res_walk
}

fn handle_dir_entry(
    path_dir_src_sub: &Path,
    spec_cp_ctx: &mut SpecCopyContext,
) -> Result<(), CopyTreeError> {
    let path_dir_dst_sub = resolve_destination(path_dir_src_sub, spec_cp_ctx)?;
    debug!(
        "preVisitDirectory({}, {})",
        path_dir_src_sub.display(),
        path_dir_dst_sub.display()
    );
    if spec_cp_ctx.spec_cp_options.if_dry_run {
        info!("[dry-run] mkdir {}", path_dir_dst_sub.display());
    } else {
        create_single_dir(&path_dir_dst_sub)?;
    }
    spec_cp_ctx.builder_cp_report.add_dir_created();
    Ok(())
}

fn handle_file_entry(
    path_file_src: &Path,
    spec_cp_ctx: &mut SpecCopyContext,
) -> Result<(), CopyTreeError> {
    let path_file_dst = resolve_destination(path_file_src, spec_cp_ctx)?;
    debug!(
        "visitFile({}, {})",
        path_file_src.display(),
        path_file_dst.display()
    );
    if spec_cp_ctx.spec_cp_options.if_dry_run {
        info!(
            "[dry-run] copy {} -> {}",
            path_file_src.display(),
            path_file_dst.display()
        );
        spec_cp_ctx.builder_cp_report.add_file_copied();
        return Ok(());
    }

    let n_replaced =
        copy_file_with_substitution(path_file_src, &path_file_dst, &spec_cp_ctx.pattern)?;
    if spec_cp_ctx.spec_cp_options.if_preserve_metadata {
        copy_metadata(path_file_src, &path_file_dst)
            .map_err(|e| CopyTreeError::io(&path_file_dst, e))?;
    }
    spec_cp_ctx.builder_cp_report.add_replacements(n_replaced);
    spec_cp_ctx.builder_cp_report.add_file_copied();
    Ok(())
}

fn handle_symlink_entry(
    path_src: &Path,
    if_target_is_dir: bool,
    spec_cp_ctx: &mut SpecCopyContext,
) -> Result<(), CopyTreeError> {
    let path_dst = resolve_destination(path_src, spec_cp_ctx)?;
    let path_link_target = fs::read_link(path_src).map_err(|e| CopyTreeError::io(path_src, e))?;
    let path_link_target = match path_link_target.to_str() {
        Some(c_target) => PathBuf::from(spec_cp_ctx.pattern.sed(c_target).into_owned()),
        None => path_link_target,
    };
    debug!(
        "symlink({}, {} -> {})",
        path_src.display(),
        path_dst.display(),
        path_link_target.display()
    );
    if spec_cp_ctx.spec_cp_options.if_dry_run {
        info!(
            "[dry-run] symlink {} -> {}",
            path_dst.display(),
            path_link_target.display()
        );
    } else {
        create_symbolic_link(&path_link_target, &path_dst, if_target_is_dir)
            .map_err(|e| CopyTreeError::io(&path_dst, e))?;
    }
    spec_cp_ctx.builder_cp_report.add_symlink_created();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::{copy, copy_tree, format_error_chain};
    use crate::rename::RenameTable;
    use crate::spec::{CopyTreeError, EnumCopySymlinkStrategy, SpecCopyOptions};

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    fn read_text(path: &Path) -> String {
        std::fs::read_to_string(path).expect("read text")
    }

    /// Sorted relative file paths under `root`.
    fn list_tree(root: &Path) -> Vec<String> {
        fn _walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
            for entry in std::fs::read_dir(dir).expect("read dir") {
                let path = entry.expect("entry").path();
                let rel = path
                    .strip_prefix(root)
                    .expect("strip")
                    .to_string_lossy()
                    .to_string();
                out.push(rel);
                if path.is_dir() && !path.is_symlink() {
                    _walk(root, &path, out);
                }
            }
        }
        let mut out = Vec::new();
        _walk(root, root, &mut out);
        out.sort();
        out
    }

    fn maven_skeleton(src: &Path) {
        write_text(
            &src.join("pom.xml"),
            "<project>\n  <groupId>com.acme</groupId>\n  <artifactId>oldproject</artifactId>\n</project>\n",
        );
        write_text(
            &src.join("src/main/java/com/acme/oldproject/App.java"),
            "package com.acme.oldproject;\n\npublic class App {}\n",
        );
        write_text(
            &src.join("src/test/java/com/acme/oldproject/oldproject.properties"),
            "name=oldproject\nlegacy=oldprojectV1",
        );
        write_text(&src.join(".git/HEAD"), "ref: refs/heads/main\n");
        write_text(&src.join(".git/objects/ab/cdef"), "blob");
        write_text(&src.join(".idea/workspace.xml"), "<oldproject/>");
        write_text(&src.join(".gitignore"), "target/\n");
        write_text(&src.join("target/classes/App.class"), "bin");
    }

    #[test]
    fn copy_tree_renames_paths_and_content() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("oldproject");
        let dst = tmp.path().join("newproject");
        maven_skeleton(&src);

        let table = RenameTable::from_pairs(["oldproject=newproject", "com.acme=org.example"]);
        let report = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect("copy tree");

        assert_eq!(
            read_text(&dst.join("pom.xml")),
            "<project>\n  <groupId>org.example</groupId>\n  <artifactId>newproject</artifactId>\n</project>\n"
        );
        assert_eq!(
            read_text(&dst.join("src/main/java/com/acme/newproject/App.java")),
            "package org.example.newproject;\n\npublic class App {}\n"
        );
        assert_eq!(
            read_text(&dst.join("src/test/java/com/acme/newproject/newproject.properties")),
            "name=newproject\nlegacy=oldprojectV1"
        );
        assert!(!dst.join("src/main/java/com/acme/oldproject").exists());
        assert_eq!(report.cnt_files_copied, 3);
        assert_eq!(report.cnt_replacements, 5);
        assert_eq!(report.cnt_renamed, 4);
        assert_eq!(report.warning_count(), 0);
    }

    #[test]
    fn copy_tree_empty_table_is_plain_copy() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        maven_skeleton(&src);
        std::fs::write(src.join("raw.bin"), b"\x00\xff\r\nno newline").expect("write raw");

        let report =
            copy_tree(&src, &dst, &RenameTable::new(), SpecCopyOptions::default()).expect("copy");
        assert_eq!(report.cnt_renamed, 0);
        assert_eq!(report.cnt_replacements, 0);

        let l_src: Vec<String> = list_tree(&src)
            .into_iter()
            .filter(|p| {
                !p.starts_with(".git") && !p.starts_with(".idea") && !p.starts_with("target")
            })
            .collect();
        assert_eq!(list_tree(&dst), l_src);
        for rel in &l_src {
            let path_src = src.join(rel);
            if path_src.is_file() {
                assert_eq!(
                    std::fs::read(&path_src).expect("read src"),
                    std::fs::read(dst.join(rel)).expect("read dst"),
                    "content differs for {rel}"
                );
            }
        }
    }

    #[test]
    fn copy_tree_excludes_ignore_set() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        maven_skeleton(&src);

        let table = RenameTable::from_pairs([".git=git", "target=out"]);
        let report = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect("copy");
        assert!(!dst.join(".git").exists());
        assert!(!dst.join("git").exists());
        assert!(!dst.join(".idea").exists());
        assert!(!dst.join(".gitignore").exists());
        assert!(!dst.join("target").exists());
        assert!(!dst.join("out").exists());
        assert_eq!(report.cnt_ignored, 4);
    }

    #[test]
    fn copy_tree_extra_ignore_patterns() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("demo.iml"), "x");
        write_text(&src.join("keep.txt"), "x");

        let spec_cp_options = SpecCopyOptions {
            patterns_ignore_extra: Some(vec!["*.iml".to_string()]),
            ..SpecCopyOptions::default()
        };
        copy_tree(&src, &dst, &RenameTable::new(), spec_cp_options).expect("copy");
        assert!(!dst.join("demo.iml").exists());
        assert!(dst.join("keep.txt").exists());
    }

    #[test]
    fn copy_tree_word_boundaries_and_swap() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("words.txt"), "FooBar\nFoo baz\n");
        write_text(&src.join("swap.txt"), "A B\n");

        let table = RenameTable::from_pairs(["Foo=Bar", "A=B", "B=A"]);
        copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect("copy");
        assert_eq!(read_text(&dst.join("words.txt")), "FooBar\nBar baz\n");
        assert_eq!(read_text(&dst.join("swap.txt")), "B A\n");
    }

    #[test]
    fn copy_tree_rejects_existing_destination() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("pom.xml"), "x");
        write_text(&dst.join("pom.xml"), "existing");

        let table = RenameTable::new();
        let err = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect_err("exists");
        assert!(matches!(err, CopyTreeError::DestinationExists(_)));
        assert!(!copy(&src, &dst, &table));
        assert_eq!(read_text(&dst.join("pom.xml")), "existing");
    }

    #[test]
    fn copy_tree_aborts_on_renamed_collision() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a.txt"), "first");
        write_text(&src.join("b.txt"), "second");
        write_text(&src.join("c.txt"), "third");

        let table = RenameTable::from_pairs(["a=b"]);
        let err = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect_err("collision");
        assert!(matches!(
            err,
            CopyTreeError::DestinationCollision { ref path } if path == &dst.join("b.txt")
        ));
        // partial tree is left as-is, later entries never start
        assert_eq!(read_text(&dst.join("b.txt")), "first");
        assert!(!dst.join("c.txt").exists());
        assert!(!copy(&src, tmp.path().join("dst2"), &table));
    }

    #[test]
    fn copy_tree_dry_run_writes_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        maven_skeleton(&src);

        let spec_cp_options = SpecCopyOptions {
            if_dry_run: true,
            ..SpecCopyOptions::default()
        };
        let table = RenameTable::from_pairs(["oldproject=newproject"]);
        let report = copy_tree(&src, &dst, &table, spec_cp_options).expect("dry run");
        assert!(!dst.exists());
        assert_eq!(report.cnt_files_copied, 3);
        assert!(report.cnt_dirs_created >= 8);
        assert_eq!(report.cnt_replacements, 0);
    }

    #[test]
    fn copy_tree_dry_run_still_detects_collision() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a/x.txt"), "x");
        write_text(&src.join("b/x.txt"), "x");

        let spec_cp_options = SpecCopyOptions {
            if_dry_run: true,
            ..SpecCopyOptions::default()
        };
        let table = RenameTable::from_pairs(["a=b"]);
        let err = copy_tree(&src, &dst, &table, spec_cp_options).expect_err("collision");
        assert!(matches!(err, CopyTreeError::DestinationCollision { .. }));
        assert!(!dst.exists());
    }

    #[test]
    fn copy_tree_rejects_source_problems() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let table = RenameTable::new();

        let err = copy_tree(&src, tmp.path().join("dst"), &table, SpecCopyOptions::default())
            .expect_err("missing source");
        assert!(matches!(err, CopyTreeError::SourceNotDirectory(_)));

        std::fs::create_dir_all(&src).expect("mkdir src");
        let err = copy_tree(&src, src.join("nested"), &table, SpecCopyOptions::default())
            .expect_err("overlap");
        assert!(matches!(err, CopyTreeError::SourceDestinationOverlap { .. }));
    }

    #[test]
    fn copy_tree_rejects_path_escaping_destination() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("up/file.txt"), "x");

        let table = RenameTable::from_pairs(["up=.."]);
        let err = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect_err("unsafe");
        assert!(matches!(err, CopyTreeError::UnsafeDestination { .. }));
        assert!(!tmp.path().join("file.txt").exists());
    }

    #[test]
    fn copy_error_chain_names_cause_once() {
        let err = CopyTreeError::io(
            "/tmp/dst/a.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(format_error_chain(&err), "IO exception: /tmp/dst/a.txt: gone");
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_aborts_on_io_failure_mid_walk() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a/ok.txt"), "ok");
        write_text(&src.join("x.txt"), "x");
        write_text(&src.join("z.txt"), "z");

        // longer than any file system allows for one name
        let name_long = "y".repeat(300);
        let table = RenameTable::from_pairs([format!("x={name_long}")]);
        let err = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect_err("io");
        assert!(matches!(
            err,
            CopyTreeError::Io { ref path, .. } if path == &dst.join(format!("{name_long}.txt"))
        ));
        assert_eq!(read_text(&dst.join("a/ok.txt")), "ok");
        assert!(!dst.join("z.txt").exists());
        assert!(!copy(&src, tmp.path().join("dst2"), &table));
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_skips_special_files_with_warning() {
        use std::os::unix::net::UnixListener;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a.txt"), "a");
        let _listener = UnixListener::bind(src.join("app.sock")).expect("bind socket");

        let report =
            copy_tree(&src, &dst, &RenameTable::new(), SpecCopyOptions::default()).expect("copy");
        assert_eq!(read_text(&dst.join("a.txt")), "a");
        assert!(std::fs::symlink_metadata(dst.join("app.sock")).is_err());
        assert_eq!(report.cnt_files_copied, 1);
        assert_eq!(report.cnt_ignored, 1);
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w.starts_with("Special file skipped"))
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn copy_tree_keeps_non_utf8_name_with_warning() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        let name_raw = OsStr::from_bytes(b"oldproject-\xff.txt");
        write_text(&src.join("oldproject").join(name_raw), "oldproject\n");

        let table = RenameTable::from_pairs(["oldproject=newproject"]);
        let report = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect("copy");
        assert_eq!(
            read_text(&dst.join("newproject").join(name_raw)),
            "newproject\n"
        );
        assert_eq!(report.cnt_files_copied, 1);
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w.starts_with("Non UTF-8 path copied without renaming"))
        );
    }

    #[test]
    fn copy_tree_creates_missing_destination_parents() {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("deep/er/dst");
        write_text(&src.join("a.txt"), "a");

        assert!(copy(&src, &dst, &RenameTable::new()));
        assert_eq!(read_text(&dst.join("a.txt")), "a");
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("mvnw"), "#!/bin/sh\necho oldproject\n");
        std::fs::set_permissions(src.join("mvnw"), std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        let table = RenameTable::from_pairs(["oldproject=newproject"]);
        copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect("copy");
        let stat_dst = std::fs::metadata(dst.join("mvnw")).expect("stat dst");
        assert_eq!(stat_dst.permissions().mode() & 0o777, 0o755);
        assert_eq!(read_text(&dst.join("mvnw")), "#!/bin/sh\necho newproject\n");
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_dereference_follows_links_and_stops_loops() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("real/oldproject.txt"), "oldproject");
        symlink(src.join("real/oldproject.txt"), src.join("alias.txt")).expect("file link");
        symlink(&src, src.join("real/loop")).expect("loop link");

        let table = RenameTable::from_pairs(["oldproject=newproject"]);
        let report = copy_tree(&src, &dst, &table, SpecCopyOptions::default()).expect("copy");
        assert!(!dst.join("alias.txt").is_symlink());
        assert_eq!(read_text(&dst.join("alias.txt")), "newproject");
        assert_eq!(read_text(&dst.join("real/newproject.txt")), "newproject");
        assert!(!dst.join("real/loop").exists());
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w.contains("Symlink loop detected"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_dereference_reports_broken_link() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir_all(&src).expect("mkdir src");
        symlink(src.join("missing"), src.join("dangling")).expect("dangling link");

        let err = copy_tree(&src, &dst, &RenameTable::new(), SpecCopyOptions::default())
            .expect_err("broken link");
        assert!(matches!(err, CopyTreeError::BrokenSymlink { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_copy_symlinks_rewrites_link_target() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("oldproject.txt"), "x");
        symlink("oldproject.txt", src.join("current")).expect("link");

        let spec_cp_options = SpecCopyOptions {
            rule_symlink: EnumCopySymlinkStrategy::CopySymlinks,
            ..SpecCopyOptions::default()
        };
        let table = RenameTable::from_pairs(["oldproject=newproject"]);
        let report = copy_tree(&src, &dst, &table, spec_cp_options).expect("copy");
        assert!(dst.join("current").is_symlink());
        assert_eq!(
            std::fs::read_link(dst.join("current")).expect("read link"),
            Path::new("newproject.txt")
        );
        assert_eq!(read_text(&dst.join("current")), "x");
        assert_eq!(report.cnt_symlinks_created, 1);
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_skip_symlinks() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write_text(&src.join("a.txt"), "a");
        symlink("a.txt", src.join("b.txt")).expect("link");

        let spec_cp_options = SpecCopyOptions {
            rule_symlink: EnumCopySymlinkStrategy::SkipSymlinks,
            ..SpecCopyOptions::default()
        };
        let report = copy_tree(&src, &dst, &RenameTable::new(), spec_cp_options).expect("copy");
        assert!(dst.join("a.txt").exists());
        assert!(std::fs::symlink_metadata(dst.join("b.txt")).is_err());
        assert_eq!(report.cnt_ignored, 1);
    }
}
