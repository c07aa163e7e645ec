//! Session state machine: one scenario run against one app.
//!
//! A [`Session`] owns its collaborators and advances through [`State`]s one tick at a
//! time. Every collaborator failure inside a tick lands the session in `ERROR` with a
//! terminal report; `step` itself never fails.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, instrument, warn};

use crate::agents::AgentContext;
use crate::agents::chat::Chat;
use crate::agents::classifier::{self, CorrectionOutcome};
use crate::agents::decider;
use crate::agents::executor::{self, ExecContext};
use crate::agents::resolver;
use crate::agents::supervisor::{self, EffectVerdict};
use crate::core::budget::SessionBudgets;
use crate::core::coords::{Rotation, ScreenGeometry};
use crate::core::memory::Memory;
use crate::core::types::{Action, AppTarget, State};
use crate::io::config::AgentConfig;
use crate::io::detector::Detector;
use crate::io::device::DeviceBridge;
use crate::io::oracle::Oracle;
use crate::io::prompt::PromptEngine;
use crate::io::recorder::{Recorder, TerminalReport};
use crate::io::screen::rotate_in_place;

/// Whether a handler lets the tick run the next state's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Yield,
}

/// What `initialize` fixed for the rest of the run.
#[derive(Debug, Clone)]
struct Task {
    app: AppTarget,
    scenario: String,
    rotation: Rotation,
    /// Foreground package before launch; seeing it again means the app was left.
    baseline_package: Option<String>,
    /// Physical size, already swapped for 90/270 degree rotations.
    device_size: (u32, u32),
}

macro_rules! agent_context {
    ($session:ident, $task:ident) => {
        AgentContext {
            oracle: &$session.oracle,
            prompts: &$session.prompts,
            chat: &mut $session.chat,
            memory: &mut $session.memory,
            app: &$task.app,
            scenario: &$task.scenario,
            config: &$session.config,
        }
    };
}

pub struct Session<O, D, B, R> {
    config: AgentConfig,
    oracle: O,
    detector: D,
    device: B,
    recorder: R,
    prompts: PromptEngine,
    chat: Chat,
    memory: Memory,
    state: State,
    budgets: SessionBudgets,
    task: Option<Task>,
    resize_ratio: Option<f64>,
    report: Option<TerminalReport>,
}

impl<O, D, B, R> Session<O, D, B, R>
where
    O: Oracle,
    D: Detector,
    B: DeviceBridge,
    R: Recorder,
{
    pub fn new(
        config: AgentConfig,
        oracle: O,
        detector: D,
        device: B,
        recorder: R,
    ) -> Result<Self> {
        config.validate().context("validate agent config")?;
        let prompts = PromptEngine::new().context("load prompt templates")?;
        let limits = &config.limits;
        let budgets = SessionBudgets::new(
            limits.loading_wait_limit,
            limits.match_error_limit,
            limits.decide_error_limit,
        );
        Ok(Self {
            config,
            oracle,
            detector,
            device,
            recorder,
            prompts,
            chat: Chat::new(),
            memory: Memory::new(),
            state: State::Uninitialized,
            budgets,
            task: None,
            resize_ratio: None,
            report: None,
        })
    }

    /// Bind the session to an app and scenario, then launch the app.
    ///
    /// A second call only warns. A failed launch finishes the session in `ERROR`.
    #[instrument(skip_all, fields(app = %app.name, rotation = rotation.degrees()))]
    pub fn initialize(
        &mut self,
        app: AppTarget,
        scenario: impl Into<String>,
        facts: BTreeMap<String, String>,
        rotation: Rotation,
    ) -> Result<()> {
        if self.state != State::Uninitialized {
            warn!(state = %self.state, "session already initialized");
            return Ok(());
        }
        self.memory.set_facts(facts);
        match self.launch(app, scenario.into(), rotation) {
            Ok(task) => {
                self.task = Some(task);
                self.transition(State::Initialized);
                Ok(())
            }
            Err(err) => {
                self.finish(State::Error, Some(format!("{err:#}")));
                Err(err)
            }
        }
    }

    fn launch(&mut self, app: AppTarget, scenario: String, rotation: Rotation) -> Result<Task> {
        let baseline_package = match self.device.current_foreground_app() {
            Ok(foreground) => Some(foreground.package),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "foreground app unknown before launch");
                None
            }
        };
        let (width, height) = self.device.screen_size().context("read device screen size")?;
        let device_size = if rotation.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        };
        self.device
            .launch_app(&app.package, &app.activity)
            .with_context(|| format!("launch {}", app.package))?;
        pause(self.config.delays.launch_ms);
        info!(
            package = %app.package,
            baseline = baseline_package.as_deref().unwrap_or("-"),
            width = device_size.0,
            height = device_size.1,
            "launched app"
        );
        Ok(Task {
            app,
            scenario,
            rotation,
            baseline_package,
            device_size,
        })
    }

    /// Run one tick and return the state it ended in.
    pub fn step(&mut self) -> State {
        if self.state.is_terminal() {
            return self.state;
        }
        if self.state == State::Uninitialized {
            warn!("step called before initialize");
            return self.state;
        }
        if let Err(err) = self.tick() {
            let reason = format!("{err:#}");
            error!(state = %self.state, %reason, "session error");
            self.finish(State::Error, Some(reason));
        }
        self.state
    }

    fn tick(&mut self) -> Result<()> {
        if self.state == State::Executing {
            self.execute()?;
        }
        self.capture()?;
        loop {
            let flow = match self.state {
                State::Initialized => {
                    self.transition(State::Observing);
                    Flow::Continue
                }
                State::Observing => self.observe()?,
                State::Executing => self.execute()?,
                State::LoadChecking => self.check_loading()?,
                State::EffectChecking => self.check_effect()?,
                State::EndChecking => self.check_end()?,
                State::Correcting => self.correct()?,
                State::Uninitialized | State::End | State::Failed | State::Error => Flow::Yield,
            };
            if flow == Flow::Yield || self.state.is_terminal() {
                return Ok(());
            }
        }
    }

    fn capture(&mut self) -> Result<()> {
        let rotation = self.task.as_ref().ok_or_else(not_initialized)?.rotation;
        let path = self
            .device
            .capture_screenshot()
            .context("capture screenshot")?;
        rotate_in_place(&path, rotation)?;
        self.memory.cache_screenshot(path);
        Ok(())
    }

    #[instrument(skip_all)]
    fn observe(&mut self) -> Result<Flow> {
        let task = self.task.as_ref().ok_or_else(not_initialized)?;
        let screenshot = self
            .memory
            .cached_screenshot()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("no screenshot captured this tick"))?;
        self.memory.save_screenshot(screenshot.clone());

        let decision = decider::next_intent(&mut agent_context!(self, task))?;

        let detection = self
            .detector
            .detect(&screenshot)
            .with_context(|| format!("detect widgets on {}", screenshot.display()))?;
        detection.validate()?;
        info!(elements = detection.elements.len(), "detected widgets");
        self.memory.save_annotated(detection.annotated);
        self.memory.set_elements(detection.elements);
        if self.resize_ratio.is_none() {
            self.resize_ratio = Some(detection.resize_ratio);
        }

        let action = resolver::resolve(&mut agent_context!(self, task), decision)?;
        self.memory.push_action(action);
        self.transition(State::Executing);
        Ok(Flow::Yield)
    }

    fn execute(&mut self) -> Result<Flow> {
        self.execute_last()?;
        self.transition(State::LoadChecking);
        Ok(Flow::Continue)
    }

    fn execute_last(&mut self) -> Result<()> {
        let task = self.task.as_ref().ok_or_else(not_initialized)?;
        let geometry = self.resize_ratio.map(|resize_ratio| ScreenGeometry {
            device_width: task.device_size.0,
            device_height: task.device_size.1,
            resize_ratio,
            rotation: task.rotation,
        });
        executor::execute_last(&mut ExecContext {
            device: &self.device,
            recorder: &mut self.recorder,
            memory: &self.memory,
            config: &self.config,
            app: &task.app,
            device_size: task.device_size,
            geometry,
            baseline_package: task.baseline_package.as_deref(),
        })
    }

    fn check_loading(&mut self) -> Result<Flow> {
        if self.budgets.loading.exhausted() {
            warn!(
                waits = self.budgets.loading.count(),
                "still loading, checking the effect anyway"
            );
            self.budgets.loading.reset();
            self.transition(State::EffectChecking);
            return Ok(Flow::Continue);
        }
        let task = self.task.as_ref().ok_or_else(not_initialized)?;
        if !supervisor::check_loading(&mut agent_context!(self, task))? {
            self.budgets.loading.reset();
            self.transition(State::EffectChecking);
            return Ok(Flow::Continue);
        }

        self.memory.push_action(Action::wait("wait for the page to finish loading"));
        let executed = self.execute_last();
        self.memory.remove_last_action();
        executed?;
        self.budgets.loading.bump();
        info!(waits = self.budgets.loading.count(), "page still loading");
        Ok(Flow::Yield)
    }

    fn check_effect(&mut self) -> Result<Flow> {
        let task = self.task.as_ref().ok_or_else(not_initialized)?;
        let verdict = supervisor::check_effect(&mut agent_context!(self, task))?;
        match verdict {
            EffectVerdict::Valid => {
                self.budgets.reset_corrections();
                self.transition(State::EndChecking);
            }
            EffectVerdict::Invalid { page_changed } => {
                if page_changed {
                    self.memory.push_action(Action::corrective_back());
                    self.execute_last()?;
                }
                self.transition(State::Correcting);
            }
        }
        Ok(Flow::Continue)
    }

    fn check_end(&mut self) -> Result<Flow> {
        let task = self.task.as_ref().ok_or_else(not_initialized)?;
        let done = supervisor::check_end(&mut agent_context!(self, task))?;
        if done {
            self.finish(State::End, None);
            return Ok(Flow::Yield);
        }
        self.transition(State::Observing);
        Ok(Flow::Continue)
    }

    #[instrument(skip_all)]
    fn correct(&mut self) -> Result<Flow> {
        let need_back = self
            .memory
            .last_action()
            .is_some_and(Action::is_corrective_back);
        if need_back {
            self.memory.remove_last_action();
        }
        let task = self.task.as_ref().ok_or_else(not_initialized)?;
        let outcome =
            classifier::correct(&mut agent_context!(self, task), &mut self.budgets, need_back)?;
        match outcome {
            CorrectionOutcome::Replaced(_) => {
                self.transition(State::Executing);
                Ok(Flow::Yield)
            }
            CorrectionOutcome::Exhausted(situation) => {
                let reason = format!(
                    "gave up after {} widget rematches and {} re-decisions (last situation {})",
                    self.budgets.matching.count(),
                    self.budgets.deciding.count(),
                    situation.number()
                );
                self.finish(State::Failed, Some(reason));
                Ok(Flow::Yield)
            }
        }
    }

    fn transition(&mut self, next: State) {
        info!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn finish(&mut self, state: State, reason: Option<String>) {
        self.transition(state);
        let device_size = self.task.as_ref().map(|task| task.device_size);
        let report = TerminalReport {
            state,
            reason,
            history: self.memory.actions().to_vec(),
            resize_ratio: self.resize_ratio,
            device_width: device_size.map(|size| size.0),
            device_height: device_size.map(|size| size.1),
            usage: self.chat.usage(),
            transcript: self.chat.transcript(),
        };
        if let Err(err) = self.recorder.report(&report) {
            warn!(err = %format!("{err:#}"), "failed to write terminal report");
        }
        info!(
            %state,
            actions = report.history.len(),
            questions = self.chat.questions(),
            "session finished"
        );
        self.report = Some(report);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn budgets(&self) -> &SessionBudgets {
        &self.budgets
    }

    pub fn resize_ratio(&self) -> Option<f64> {
        self.resize_ratio
    }

    /// Set once a terminal state was reached.
    pub fn report(&self) -> Option<&TerminalReport> {
        self.report.as_ref()
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn device(&self) -> &B {
        &self.device
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }
}

fn not_initialized() -> anyhow::Error {
    anyhow!("session is not initialized")
}

fn pause(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
