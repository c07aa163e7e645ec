//! Run artifacts: per-action records and the terminal report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::core::types::{Action, State};
use crate::io::config::RecorderConfig;

/// One executed action with the command that carried it out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    #[serde(flatten)]
    pub action: Action,
    pub command: String,
    /// Annotated screenshot for widget actions, the plain one otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Summary emitted once a session reaches `END`, `FAILED` or `ERROR`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalReport {
    pub state: State,
    pub reason: Option<String>,
    pub history: Vec<Action>,
    #[serde(rename = "resize-ratio")]
    pub resize_ratio: Option<f64>,
    #[serde(rename = "device-width")]
    pub device_width: Option<u32>,
    #[serde(rename = "device-height")]
    pub device_height: Option<u32>,
    pub usage: TokenUsage,
    #[serde(skip)]
    pub transcript: String,
}

pub trait Recorder {
    fn record(&mut self, record: ActionRecord) -> Result<()>;
    fn report(&mut self, report: &TerminalReport) -> Result<()>;
}

#[derive(Serialize)]
struct ScriptFile<'a> {
    state: State,
    reason: Option<&'a str>,
    actions: &'a [ActionRecord],
    history: &'a [Action],
    #[serde(rename = "resize-ratio")]
    resize_ratio: Option<f64>,
    #[serde(rename = "device-width")]
    device_width: Option<u32>,
    #[serde(rename = "device-height")]
    device_height: Option<u32>,
    usage: TokenUsage,
}

/// Paths of the two files a finished run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub script: PathBuf,
    pub chat: PathBuf,
}

impl ReportPaths {
    pub fn new(config: &RecorderConfig, stem: &str, state: State) -> Self {
        let suffix = if state == State::End { "" } else { "-failed" };
        Self {
            script: config.script_dir.join(format!("{stem}{suffix}.json")),
            chat: config.chat_dir.join(format!("{stem}-chat.txt")),
        }
    }
}

/// Writes `<scenario>-<app>-<timestamp>[-failed].json` plus a chat transcript.
pub struct FileRecorder {
    config: RecorderConfig,
    stem: String,
    records: Vec<ActionRecord>,
    written: Option<ReportPaths>,
}

impl FileRecorder {
    pub fn new(config: &RecorderConfig, scenario: &str, app: &str) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::with_stem(config, format!("{}-{}-{stamp}", file_safe(scenario), file_safe(app)))
    }

    pub fn with_stem(config: &RecorderConfig, stem: String) -> Self {
        Self {
            config: config.clone(),
            stem,
            records: Vec::new(),
            written: None,
        }
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Set once `report` has written its files.
    pub fn written(&self) -> Option<&ReportPaths> {
        self.written.as_ref()
    }
}

impl Recorder for FileRecorder {
    fn record(&mut self, record: ActionRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn report(&mut self, report: &TerminalReport) -> Result<()> {
        let paths = ReportPaths::new(&self.config, &self.stem, report.state);
        write_json(
            &paths.script,
            &ScriptFile {
                state: report.state,
                reason: report.reason.as_deref(),
                actions: &self.records,
                history: &report.history,
                resize_ratio: report.resize_ratio,
                device_width: report.device_width,
                device_height: report.device_height,
                usage: report.usage,
            },
        )?;
        write_text(&paths.chat, &report.transcript)?;
        info!(script = %paths.script.display(), chat = %paths.chat.display(), "wrote run report");
        self.written = Some(paths);
        Ok(())
    }
}

fn file_safe(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
