//! Copy report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

/// Aggregate counters and diagnostics for one `copy_tree` run.
#[derive(Debug, Default, Clone)]
pub struct ReportCopy {
    /// Total visited directory/file entries, ignored ones included.
    pub cnt_scanned: u64,
    /// Destination directories created (or planned in dry-run).
    pub cnt_dirs_created: u64,
    /// Files copied with substitution (or planned in dry-run).
    pub cnt_files_copied: u64,
    /// Symbolic links recreated at destination.
    pub cnt_symlinks_created: u64,
    /// Entries excluded by the ignore set, symlink policy or file type.
    pub cnt_ignored: u64,
    /// Entries whose destination relative path differs from the source one.
    pub cnt_renamed: u64,
    /// Symbol occurrences rewritten inside file content.
    pub cnt_replacements: u64,
    /// Non-fatal warnings collected during traversal.
    pub warnings: Vec<String>,
}

impl ReportCopy {
    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_scanned".to_string(), self.cnt_scanned);
        dict_counts.insert("cnt_dirs_created".to_string(), self.cnt_dirs_created);
        dict_counts.insert("cnt_files_copied".to_string(), self.cnt_files_copied);
        dict_counts.insert(
            "cnt_symlinks_created".to_string(),
            self.cnt_symlinks_created,
        );
        dict_counts.insert("cnt_ignored".to_string(), self.cnt_ignored);
        dict_counts.insert("cnt_renamed".to_string(), self.cnt_renamed);
        dict_counts.insert("cnt_replacements".to_string(), self.cnt_replacements);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} scanned={} dirs={} files={} symlinks={} ignored={} renamed={} replacements={} warnings={}",
            dict_counts["cnt_scanned"],
            dict_counts["cnt_dirs_created"],
            dict_counts["cnt_files_copied"],
            dict_counts["cnt_symlinks_created"],
            dict_counts["cnt_ignored"],
            dict_counts["cnt_renamed"],
            dict_counts["cnt_replacements"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[FORK]"))
    }
}

/// Mutable accumulator for copy statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportCopyBuilder {
    report: ReportCopy,
}

impl ReportCopyBuilder {
    pub fn add_scanned(&mut self) {
        self.report.cnt_scanned += 1;
    }

    pub fn add_dir_created(&mut self) {
        self.report.cnt_dirs_created += 1;
    }

    pub fn add_file_copied(&mut self) {
        self.report.cnt_files_copied += 1;
    }

    pub fn add_symlink_created(&mut self) {
        self.report.cnt_symlinks_created += 1;
    }

    pub fn add_ignored(&mut self) {
        self.report.cnt_ignored += 1;
    }

    pub fn add_renamed(&mut self) {
        self.report.cnt_renamed += 1;
    }

    pub fn add_replacements(&mut self, value: u64) {
        self.report.cnt_replacements += value;
    }

    /// Add warning message; it is also emitted as a `warn` event.
    pub fn add_warning(&mut self, warning: String) {
        tracing::warn!("{warning}");
        self.report.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportCopy {
        self.report
    }
}
