//! Scripted collaborators and builders for session tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use image::RgbImage;
use tempfile::TempDir;

use crate::core::conversation::Role;
use crate::core::types::{BoundingBox, Element};
use crate::io::config::{AgentConfig, DelayConfig, RecorderConfig};
use crate::io::detector::{Detection, Detector};
use crate::io::device::{DeviceBridge, ForegroundApp};
use crate::io::oracle::{Oracle, OracleReply, OracleRequest, Purpose};
use crate::io::recorder::{ActionRecord, Recorder, TerminalReport};

pub const LAUNCHER_PACKAGE: &str = "com.android.launcher";

/// Oracle answering from per-purpose queues. The last answer of a queue repeats.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: RefCell<BTreeMap<Purpose, VecDeque<String>>>,
    asked: RefCell<Vec<(Purpose, String)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, purpose: Purpose, text: &str) -> Self {
        self.answers
            .borrow_mut()
            .entry(purpose)
            .or_default()
            .push_back(text.to_string());
        self
    }

    pub fn answers(self, purpose: Purpose, texts: &[&str]) -> Self {
        texts
            .iter()
            .fold(self, |oracle, text| oracle.answer(purpose, text))
    }

    pub fn asked(&self) -> usize {
        self.asked.borrow().len()
    }

    pub fn asked_for(&self, purpose: Purpose) -> usize {
        self.asked
            .borrow()
            .iter()
            .filter(|(asked, _)| *asked == purpose)
            .count()
    }

    /// Purposes in the order they were asked.
    pub fn purposes(&self) -> Vec<Purpose> {
        self.asked.borrow().iter().map(|(purpose, _)| *purpose).collect()
    }

    /// The user turn of the most recent question for `purpose`.
    pub fn last_prompt(&self, purpose: Purpose) -> Option<String> {
        self.asked
            .borrow()
            .iter()
            .rev()
            .find(|(asked, _)| *asked == purpose)
            .map(|(_, prompt)| prompt.clone())
    }
}

impl Oracle for ScriptedOracle {
    fn ask(&self, request: &OracleRequest<'_>) -> Result<OracleReply> {
        let prompt = request
            .conversation
            .messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.text.clone())
            .unwrap_or_default();
        self.asked.borrow_mut().push((request.purpose, prompt));

        let mut answers = self.answers.borrow_mut();
        let queue = answers
            .get_mut(&request.purpose)
            .filter(|queue| !queue.is_empty())
            .ok_or_else(|| anyhow!("no scripted answer for {}", request.purpose))?;
        let text = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(OracleReply {
            text,
            tokens_in: 10,
            tokens_out: 2,
        })
    }
}

/// Detector returning queued detections. The last one repeats.
#[derive(Debug)]
pub struct ScriptedDetector {
    detections: RefCell<VecDeque<Detection>>,
    calls: Cell<u32>,
}

impl ScriptedDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections: RefCell::new(detections.into()),
            calls: Cell::new(0),
        }
    }

    /// Detector that always reports `elements` at a resize ratio of 1.
    pub fn fixed(elements: Vec<Element>) -> Self {
        Self::new(vec![detection(elements)])
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, screenshot: &Path) -> Result<Detection> {
        self.calls.set(self.calls.get() + 1);
        let mut detections = self.detections.borrow_mut();
        let detection = if detections.len() > 1 {
            detections.pop_front()
        } else {
            detections.front().cloned()
        };
        let mut detection = detection.context("no scripted detection")?;
        detection.annotated = screenshot.with_extension("annotated.png");
        Ok(detection)
    }
}

/// Device that records commands instead of driving hardware.
///
/// The foreground app starts as the launcher and follows `launch_app`.
#[derive(Debug)]
pub struct FakeDevice {
    commands: RefCell<Vec<String>>,
    foreground: RefCell<String>,
    screen: (u32, u32),
    captures: Cell<u32>,
    broken_foreground: bool,
    screenshot_dir: Option<PathBuf>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::running(LAUNCHER_PACKAGE)
    }

    pub fn running(package: &str) -> Self {
        Self {
            commands: RefCell::new(Vec::new()),
            foreground: RefCell::new(package.to_string()),
            screen: (1080, 1920),
            captures: Cell::new(0),
            broken_foreground: false,
            screenshot_dir: None,
        }
    }

    pub fn with_screen_size(self, width: u32, height: u32) -> Self {
        Self {
            screen: (width, height),
            ..self
        }
    }

    /// Foreground queries fail.
    pub fn with_broken_foreground(self) -> Self {
        Self {
            broken_foreground: true,
            ..self
        }
    }

    /// Write real (tiny) PNG screenshots into `dir` instead of returning bare names.
    pub fn with_screenshot_dir(self, dir: &Path) -> Self {
        Self {
            screenshot_dir: Some(dir.to_path_buf()),
            ..self
        }
    }

    /// Simulate the app closing behind the agent's back.
    pub fn leave_app(&self) {
        *self.foreground.borrow_mut() = LAUNCHER_PACKAGE.to_string();
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn captures(&self) -> u32 {
        self.captures.get()
    }

    fn run(&self, command: String) -> Result<String> {
        self.commands.borrow_mut().push(command.clone());
        Ok(command)
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBridge for FakeDevice {
    fn tap(&self, x: i32, y: i32) -> Result<String> {
        self.run(format!("tap {x} {y}"))
    }

    fn input_text(&self, text: &str) -> Result<String> {
        self.run(format!("text {text}"))
    }

    fn swipe(&self, from: (i32, i32), to: (i32, i32), _duration_ms: u64) -> Result<String> {
        self.run(format!("swipe {} {} {} {}", from.0, from.1, to.0, to.1))
    }

    fn press_back(&self) -> Result<String> {
        self.run("back".to_string())
    }

    fn delete_chars(&self, count: usize) -> Result<String> {
        self.run(format!("delete {count}"))
    }

    fn launch_app(&self, package: &str, activity: &str) -> Result<String> {
        *self.foreground.borrow_mut() = package.to_string();
        self.run(format!("launch {package}/{activity}"))
    }

    fn stop_app(&self, package: &str) -> Result<String> {
        self.run(format!("stop {package}"))
    }

    fn capture_screenshot(&self) -> Result<PathBuf> {
        let index = self.captures.get() + 1;
        self.captures.set(index);
        let name = format!("screen-{index}.png");
        let Some(dir) = &self.screenshot_dir else {
            return Ok(PathBuf::from(name));
        };
        let path = dir.join(name);
        RgbImage::new(2, 4)
            .save(&path)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    fn current_foreground_app(&self) -> Result<ForegroundApp> {
        if self.broken_foreground {
            bail!("dumpsys window unavailable");
        }
        Ok(ForegroundApp {
            package: self.foreground.borrow().clone(),
            activity: ".Main".to_string(),
        })
    }

    fn screen_size(&self) -> Result<(u32, u32)> {
        Ok(self.screen)
    }
}

/// Recorder keeping everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    pub records: Vec<ActionRecord>,
    pub reports: Vec<TerminalReport>,
    /// Reject every write.
    pub fail: bool,
}

impl Recorder for MemoryRecorder {
    fn record(&mut self, record: ActionRecord) -> Result<()> {
        if self.fail {
            bail!("recorder is read-only");
        }
        self.records.push(record);
        Ok(())
    }

    fn report(&mut self, report: &TerminalReport) -> Result<()> {
        if self.fail {
            bail!("recorder is read-only");
        }
        self.reports.push(report.clone());
        Ok(())
    }
}

/// Temporary directory with a config whose delays are zero and whose artifacts
/// land inside the directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("create temp dir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> AgentConfig {
        AgentConfig {
            delays: DelayConfig::none(),
            recorder: RecorderConfig {
                script_dir: self.path().join("scripts"),
                chat_dir: self.path().join("chats"),
            },
            ..AgentConfig::default()
        }
    }
}

/// Element without text.
pub fn element(id: i32, bbox: BoundingBox) -> Element {
    Element {
        id,
        bbox,
        text: None,
        description: None,
        parent: None,
        children: Vec::new(),
    }
}

/// Element with recognized text.
pub fn text_element(id: i32, text: &str, bbox: BoundingBox) -> Element {
    Element {
        text: Some(text.to_string()),
        ..element(id, bbox)
    }
}

pub fn detection(elements: Vec<Element>) -> Detection {
    Detection {
        annotated: PathBuf::from("annotated.png"),
        resize_ratio: 1.0,
        elements,
    }
}
