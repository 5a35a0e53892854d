use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use forkit_io_fs::{
    EnumCopySymlinkStrategy, RenameTable, ReportCopy, SpecCopyOptions, copy_tree,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const C_APP_ABOUT: &str = "Copies a project from a source to a destination directory, \
renaming the project as well.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EnumArgSymlink {
    /// Follow links and copy what they point to.
    Dereference,
    /// Recreate links, renaming symbols in the link target.
    Copy,
    /// Leave links out.
    Skip,
}

impl From<EnumArgSymlink> for EnumCopySymlinkStrategy {
    fn from(value: EnumArgSymlink) -> Self {
        match value {
            EnumArgSymlink::Dereference => Self::Dereference,
            EnumArgSymlink::Copy => Self::CopySymlinks,
            EnumArgSymlink::Skip => Self::SkipSymlinks,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "forkit", version, about = C_APP_ABOUT)]
struct Cli {
    /// Source project directory.
    #[arg(long = "from", value_name = "SOURCE")]
    source: PathBuf,
    /// Destination project directory.
    #[arg(long = "to", value_name = "DESTINATION")]
    destination: PathBuf,
    /// Symbol replacement table.
    #[arg(long = "map", value_name = "OLD=NEW")]
    map: Vec<String>,
    /// Do not execute, dry run only.
    #[arg(long)]
    noop: bool,
    /// Run verbosely.
    #[arg(short, long)]
    verbose: bool,
    /// Extra base-name glob to skip, on top of .git, .idea, .gitignore and target.
    #[arg(long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,
    /// Symbolic link handling.
    #[arg(long, value_enum, default_value_t = EnumArgSymlink::Dereference)]
    symlinks: EnumArgSymlink,
    /// Do not copy permissions, times and extended attributes.
    #[arg(long)]
    no_preserve_metadata: bool,
}

impl Cli {
    fn to_copy_options(&self) -> SpecCopyOptions {
        SpecCopyOptions {
            patterns_ignore_extra: (!self.ignore.is_empty()).then(|| self.ignore.clone()),
            rule_symlink: self.symlinks.into(),
            if_preserve_metadata: !self.no_preserve_metadata,
            if_dry_run: self.noop,
            ..SpecCopyOptions::default()
        }
    }
}

fn init_logging(cli: &Cli) {
    let c_level_default = if cli.verbose {
        "debug"
    } else if cli.noop {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(c_level_default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<ReportCopy> {
    if !cli.source.is_dir() {
        bail!("invalid source: {}", cli.source.display());
    }
    if fs::symlink_metadata(&cli.destination).is_ok() {
        bail!("existing destination: {}", cli.destination.display());
    }

    let table = RenameTable::from_pairs(&cli.map);
    let report = copy_tree(
        &cli.source,
        &cli.destination,
        &table,
        cli.to_copy_options(),
    )
    .with_context(|| {
        format!(
            "failed to copy {} to {}",
            cli.source.display(),
            cli.destination.display()
        )
    })?;
    Ok(report)
}

/// Parse arguments; on `Err`, the message is already printed.
///
/// `--help` and `--version` exit 0, every usage error exits 1.
fn parse_cli<I, T>(args: I) -> Result<Cli, ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| {
        // nothing better to do when stderr itself is gone
        let _ = e.print();
        if e.use_stderr() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    })
}

fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(v) => v,
        Err(code) => return code,
    };
    init_logging(&cli);

    match run(&cli) {
        Ok(report) => {
            info!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
