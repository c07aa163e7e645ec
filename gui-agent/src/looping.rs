//! Drive a session tick by tick for `gui-agent run`.

use anyhow::{Result, bail};
use tracing::info;

use crate::core::types::State;
use crate::io::detector::Detector;
use crate::io::device::DeviceBridge;
use crate::io::oracle::Oracle;
use crate::io::recorder::Recorder;
use crate::session::Session;

/// Reason why `run_to_completion` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The scenario was judged complete.
    End,
    /// Correction budgets ran out.
    Failed,
    /// A collaborator failed or answered outside the protocol.
    Error { reason: Option<String> },
    /// `max_ticks` ticks ran without reaching a terminal state.
    TickLimit { max_ticks: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub ticks: u32,
    pub actions: usize,
    pub stop: LoopStop,
}

/// Step `session` until it reaches a terminal state or `max_ticks` ticks ran.
///
/// `on_step` sees the tick number and the state each tick ended in.
pub fn run_to_completion<O, D, B, R, F>(
    session: &mut Session<O, D, B, R>,
    max_ticks: u32,
    mut on_step: F,
) -> Result<LoopOutcome>
where
    O: Oracle,
    D: Detector,
    B: DeviceBridge,
    R: Recorder,
    F: FnMut(u32, State),
{
    if session.state() == State::Uninitialized {
        bail!("session must be initialized before running");
    }

    let mut ticks = 0u32;
    while !session.state().is_terminal() {
        if ticks >= max_ticks {
            info!(ticks, "tick limit reached");
            return Ok(LoopOutcome {
                ticks,
                actions: session.memory().actions().len(),
                stop: LoopStop::TickLimit { max_ticks },
            });
        }
        let state = session.step();
        ticks += 1;
        on_step(ticks, state);
    }

    let stop = match session.state() {
        State::End => LoopStop::End,
        State::Failed => LoopStop::Failed,
        _ => LoopStop::Error {
            reason: session.report().and_then(|report| report.reason.clone()),
        },
    };
    Ok(LoopOutcome {
        ticks,
        actions: session.memory().actions().len(),
        stop,
    })
}
