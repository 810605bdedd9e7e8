//! The four-stage output protocol.
//!
//! An upgrade is written into four append-only sinks:
//!
//! | Stage    | Contents                                              |
//! |----------|-------------------------------------------------------|
//! | `Stage1` | schema additions and alterations, before data changes |
//! | `Stage2` | data inserts and updates                              |
//! | `Stage3` | schema removals and post-data constraints             |
//! | `Stage4` | data deletes                                          |
//!
//! Additive changes always precede destructive ones, and schema changes
//! bracket data changes, so every intermediate state stays
//! constraint-valid. In single-stage mode the four sinks merge, in order,
//! into one script.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four output stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Pre-data schema changes.
    Stage1,
    /// Data inserts and updates.
    Stage2,
    /// Post-data schema changes.
    Stage3,
    /// Data deletes.
    Stage4,
}

impl Stage {
    /// All stages in output order.
    pub const ALL: [Self; 4] = [Self::Stage1, Self::Stage2, Self::Stage3, Self::Stage4];

    /// Stage number, 1-based.
    #[must_use]
    pub const fn number(self) -> usize {
        match self {
            Self::Stage1 => 1,
            Self::Stage2 => 2,
            Self::Stage3 => 3,
            Self::Stage4 => 4,
        }
    }

    const fn index(self) -> usize {
        self.number() - 1
    }

    /// Returns whether the stage carries data changes.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Stage2 | Self::Stage4)
    }

    /// Short description used in script headers.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Stage1 => "schema changes before data changes",
            Self::Stage2 => "data inserts and updates",
            Self::Stage3 => "schema changes after data changes",
            Self::Stage4 => "data deletes",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage{}", self.number())
    }
}

/// Statements that open and close a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEnvelope {
    /// Statement opening the transaction.
    pub begin: String,
    /// Statement committing it.
    pub commit: String,
}

/// One append-only stage sink.
#[derive(Debug, Clone, Default)]
pub struct StageBuffer {
    header: Vec<String>,
    body: Vec<String>,
    footer: Vec<String>,
}

impl StageBuffer {
    /// Appends an entry (a statement or a comment) to the body.
    pub fn write(&mut self, text: impl Into<String>) {
        self.body.push(text.into());
    }

    /// Appends a line to the header.
    pub fn append_header(&mut self, text: impl Into<String>) {
        self.header.push(text.into());
    }

    /// Appends a line to the footer.
    pub fn append_footer(&mut self, text: impl Into<String>) {
        self.footer.push(text.into());
    }

    /// Returns whether the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Body entries written so far.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.body
    }
}

/// Identifies a finished script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// One of the four stages.
    Stage(Stage),
    /// Stages 1–4 merged.
    SingleStage,
}

impl ScriptKind {
    /// File stem for the script, e.g. `upgrade_stage2_data`.
    #[must_use]
    pub fn file_stem(self, prefix: &str) -> String {
        match self {
            Self::Stage(stage) => {
                let kind = if stage.is_data() { "data" } else { "schema" };
                format!("{prefix}_{stage}_{kind}")
            }
            Self::SingleStage => format!("{prefix}_single_stage"),
        }
    }
}

/// A finished script: header lines, body entries, footer lines and an
/// optional transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageScript {
    /// Which script this is.
    pub kind: ScriptKind,
    /// Header lines (comments).
    pub header: Vec<String>,
    /// Body entries.
    pub body: Vec<String>,
    /// Footer lines (comments).
    pub footer: Vec<String>,
    /// Transaction envelope, if the script is transactional.
    pub envelope: Option<TransactionEnvelope>,
}

impl StageScript {
    /// Returns whether the script has no body. Empty scripts render as
    /// empty text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Renders `entries`, framed by the header, envelope and footer.
    #[must_use]
    pub fn render_entries(&self, entries: &[String]) -> String {
        if entries.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for line in &self.header {
            out.push_str(line);
            out.push('\n');
        }
        if let Some(ref envelope) = self.envelope {
            out.push_str(&envelope.begin);
            out.push('\n');
        }
        for entry in entries {
            out.push_str(entry);
            out.push('\n');
        }
        if let Some(ref envelope) = self.envelope {
            out.push_str(&envelope.commit);
            out.push('\n');
        }
        for line in &self.footer {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Renders the whole script.
    #[must_use]
    pub fn render(&self) -> String {
        self.render_entries(&self.body)
    }
}

/// The output of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageScripts {
    scripts: Vec<StageScript>,
}

impl StageScripts {
    /// Returns every script in output order.
    #[must_use]
    pub fn scripts(&self) -> &[StageScript] {
        &self.scripts
    }

    /// Returns the script of `stage` (`None` in single-stage mode).
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageScript> {
        self.scripts
            .iter()
            .find(|s| s.kind == ScriptKind::Stage(stage))
    }

    /// Rendered text of `stage`, or an empty string.
    #[must_use]
    pub fn stage_text(&self, stage: Stage) -> String {
        self.stage(stage).map(StageScript::render).unwrap_or_default()
    }

    /// The merged script in single-stage mode.
    #[must_use]
    pub fn single_stage(&self) -> Option<&StageScript> {
        self.scripts
            .iter()
            .find(|s| s.kind == ScriptKind::SingleStage)
    }

    /// Returns whether every script is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.iter().all(StageScript::is_empty)
    }
}

/// The four stage sinks of one run.
///
/// Buffers are append-only. [`StageEmitter::finish`] consumes the emitter;
/// dropping it without finishing discards everything written.
#[derive(Debug)]
pub struct StageEmitter {
    buffers: [StageBuffer; 4],
    envelope: Option<TransactionEnvelope>,
    single_stage: bool,
}

impl StageEmitter {
    /// Creates an emitter. `envelope` is `None` when the dialect's DDL
    /// cannot run inside a transaction.
    #[must_use]
    pub fn new(envelope: Option<TransactionEnvelope>, single_stage: bool) -> Self {
        Self {
            buffers: Default::default(),
            envelope,
            single_stage,
        }
    }

    /// Returns the sink of `stage`.
    pub fn stage(&mut self, stage: Stage) -> &mut StageBuffer {
        &mut self.buffers[stage.index()]
    }

    /// Read access to the sink of `stage`.
    #[must_use]
    pub fn buffer(&self, stage: Stage) -> &StageBuffer {
        &self.buffers[stage.index()]
    }

    /// Returns whether the emitter merges stages.
    #[must_use]
    pub const fn is_single_stage(&self) -> bool {
        self.single_stage
    }

    /// Closes the sinks and produces the scripts.
    #[must_use]
    pub fn finish(self) -> StageScripts {
        let Self {
            buffers,
            envelope,
            single_stage,
        } = self;

        if single_stage {
            let mut body = Vec::new();
            for buffer in buffers {
                if buffer.body.is_empty() {
                    continue;
                }
                body.extend(buffer.header);
                body.extend(buffer.body);
                body.extend(buffer.footer);
            }
            return StageScripts {
                scripts: vec![StageScript {
                    kind: ScriptKind::SingleStage,
                    header: Vec::new(),
                    body,
                    footer: Vec::new(),
                    envelope,
                }],
            };
        }

        let scripts = Stage::ALL
            .into_iter()
            .zip(buffers)
            .map(|(stage, buffer)| StageScript {
                kind: ScriptKind::Stage(stage),
                header: buffer.header,
                body: buffer.body,
                footer: buffer.footer,
                envelope: envelope.clone(),
            })
            .collect();
        StageScripts { scripts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> Option<TransactionEnvelope> {
        Some(TransactionEnvelope {
            begin: "BEGIN;".into(),
            commit: "COMMIT;".into(),
        })
    }

    #[test]
    fn empty_stage_renders_nothing() {
        let mut emitter = StageEmitter::new(envelope(), false);
        emitter.stage(Stage::Stage1).append_header("-- stage 1");
        let scripts = emitter.finish();
        assert!(scripts.is_empty());
        assert_eq!(scripts.stage_text(Stage::Stage1), "");
    }

    #[test]
    fn stage_is_wrapped_in_transaction() {
        let mut emitter = StageEmitter::new(envelope(), false);
        let stage1 = emitter.stage(Stage::Stage1);
        stage1.append_header("-- head");
        stage1.write("CREATE TABLE t (id int);");
        stage1.append_footer("-- foot");

        let text = emitter.finish().stage_text(Stage::Stage1);
        assert_eq!(
            text,
            "-- head\nBEGIN;\nCREATE TABLE t (id int);\nCOMMIT;\n-- foot\n"
        );
    }

    #[test]
    fn no_envelope_for_non_transactional_dialects() {
        let mut emitter = StageEmitter::new(None, false);
        emitter.stage(Stage::Stage3).write("DROP TABLE t;");
        let text = emitter.finish().stage_text(Stage::Stage3);
        assert_eq!(text, "DROP TABLE t;\n");
    }

    #[test]
    fn single_stage_merges_in_order() {
        let mut emitter = StageEmitter::new(envelope(), true);
        emitter.stage(Stage::Stage4).write("DELETE 4;");
        emitter.stage(Stage::Stage2).write("INSERT 2;");
        emitter.stage(Stage::Stage1).write("CREATE 1;");
        emitter.stage(Stage::Stage3).append_header("-- stage 3");

        let scripts = emitter.finish();
        assert!(scripts.stage(Stage::Stage1).is_none());
        let single = scripts.single_stage().unwrap();
        assert_eq!(
            single.render(),
            "BEGIN;\nCREATE 1;\nINSERT 2;\nDELETE 4;\nCOMMIT;\n"
        );
    }

    #[test]
    fn file_stems() {
        assert_eq!(
            ScriptKind::Stage(Stage::Stage1).file_stem("upgrade"),
            "upgrade_stage1_schema"
        );
        assert_eq!(
            ScriptKind::Stage(Stage::Stage4).file_stem("upgrade"),
            "upgrade_stage4_data"
        );
        assert_eq!(ScriptKind::SingleStage.file_stem("build"), "build_single_stage");
    }
}
