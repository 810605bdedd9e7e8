//! Flushing finished stage scripts to files or streams.
//!
//! Each non-empty script becomes one or more files named
//! `<prefix>_<stage>_<kind><N>.sql`, numbered from 1. A script whose body
//! holds more entries than `max_entries_per_file` is split; every part
//! repeats the header and the transaction envelope so it can run on its own.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::stage::{StageScript, StageScripts};

/// Where and how scripts are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    /// Directory receiving the files. Created if missing.
    pub directory: PathBuf,
    /// File name prefix.
    pub prefix: String,
    /// Maximum body entries per file; `None` writes each script whole.
    pub max_entries_per_file: Option<usize>,
    /// Timestamp written into the banner; defaults to the time of writing.
    pub generated_at: Option<DateTime<Utc>>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            prefix: "upgrade".to_string(),
            max_entries_per_file: None,
            generated_at: None,
        }
    }
}

impl OutputOptions {
    /// Writes into `directory` with the default prefix.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Sets the file name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Splits scripts after `max` entries. Zero is treated as no limit.
    #[must_use]
    pub fn with_max_entries_per_file(mut self, max: usize) -> Self {
        self.max_entries_per_file = (max > 0).then_some(max);
        self
    }

    /// Pins the banner timestamp.
    #[must_use]
    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }
}

fn banner(at: DateTime<Utc>) -> String {
    format!(
        "-- Generated by oxide-steward on {}\n",
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Splits the body of `script` into file-sized parts.
fn parts<'s>(script: &'s StageScript, max: Option<usize>) -> Vec<&'s [String]> {
    if script.is_empty() {
        return Vec::new();
    }
    match max {
        Some(max) => script.body.chunks(max).collect(),
        None => vec![script.body.as_slice()],
    }
}

/// Writes every non-empty script of `scripts` and returns the written paths
/// in output order.
pub fn write_scripts(scripts: &StageScripts, options: &OutputOptions) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&options.directory)?;
    let at = options.generated_at.unwrap_or_else(Utc::now);
    let mut written = Vec::new();

    for script in scripts.scripts() {
        let stem = script.kind.file_stem(&options.prefix);
        let parts = parts(script, options.max_entries_per_file);
        if parts.is_empty() {
            debug!(script = %stem, "Skipping empty script");
            continue;
        }
        for (n, entries) in parts.into_iter().enumerate() {
            let path = options.directory.join(format!("{stem}{}.sql", n + 1));
            let mut text = banner(at);
            text.push_str(&script.render_entries(entries));
            std::fs::write(&path, text)?;
            debug!(path = %path.display(), entries = entries.len(), "Wrote script");
            written.push(path);
        }
    }

    info!(
        directory = %options.directory.display(),
        files = written.len(),
        "Scripts written"
    );
    Ok(written)
}

/// Writes every non-empty script of `scripts` to `sink`, one after the
/// other, without splitting.
pub fn write_to<W: Write>(scripts: &StageScripts, sink: &mut W) -> Result<()> {
    for script in scripts.scripts().iter().filter(|s| !s.is_empty()) {
        sink.write_all(script.render().as_bytes())?;
    }
    sink.flush()?;
    Ok(())
}

/// Returns whether `path` looks like a script written by [`write_scripts`]
/// for `prefix`.
#[must_use]
pub fn is_script_file(path: &Path, prefix: &str) -> bool {
    path.extension().is_some_and(|ext| ext == "sql")
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&format!("{prefix}_")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Stage, StageEmitter, TransactionEnvelope};
    use chrono::TimeZone;

    fn scripts(single_stage: bool) -> StageScripts {
        let mut emitter = StageEmitter::new(
            Some(TransactionEnvelope {
                begin: "BEGIN;".into(),
                commit: "COMMIT;".into(),
            }),
            single_stage,
        );
        emitter.stage(Stage::Stage1).append_header("-- stage1");
        for n in 0..5 {
            emitter
                .stage(Stage::Stage1)
                .write(format!("CREATE TABLE t{n} (id int);"));
        }
        emitter.stage(Stage::Stage4).write("DELETE FROM t0 WHERE id = 1;");
        emitter.finish()
    }

    fn options(dir: &Path) -> OutputOptions {
        OutputOptions::new(dir)
            .with_prefix("upgrade")
            .with_generated_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn writes_only_non_empty_stages() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_scripts(&scripts(false), &options(dir.path())).unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["upgrade_stage1_schema1.sql", "upgrade_stage4_data1.sql"]
        );

        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert!(text.starts_with("-- Generated by oxide-steward on 2024-05-01 12:00:00 UTC\n"));
        assert!(text.contains("-- stage1\nBEGIN;\nCREATE TABLE t0 (id int);"));
        assert!(text.ends_with("COMMIT;\n"));
    }

    #[test]
    fn long_scripts_are_split() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_scripts(
            &scripts(false),
            &options(dir.path()).with_max_entries_per_file(2),
        )
        .unwrap();
        assert_eq!(written.len(), 4);
        assert!(written[2].ends_with("upgrade_stage1_schema3.sql"));

        for path in &written[..3] {
            let text = std::fs::read_to_string(path).unwrap();
            assert!(text.contains("-- stage1\nBEGIN;\n"));
            assert!(text.contains("COMMIT;\n"));
        }
        let last = std::fs::read_to_string(&written[2]).unwrap();
        assert!(last.contains("CREATE TABLE t4"));
        assert!(!last.contains("CREATE TABLE t3"));
    }

    #[test]
    fn single_stage_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_scripts(&scripts(true), &options(dir.path())).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("upgrade_single_stage1.sql"));
        assert!(is_script_file(&written[0], "upgrade"));
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let options = OutputOptions::default().with_max_entries_per_file(0);
        assert_eq!(options.max_entries_per_file, None);
    }

    #[test]
    fn stream_output_concatenates_scripts() {
        let mut sink = Vec::new();
        write_to(&scripts(false), &mut sink).unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("CREATE TABLE t4 (id int);\nCOMMIT;\nBEGIN;\nDELETE FROM t0"));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out").join("sql");
        let written = write_scripts(&scripts(false), &options(&nested)).unwrap();
        assert!(written.iter().all(|p| p.starts_with(&nested)));
    }
}
