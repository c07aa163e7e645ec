//! Carry out the last action in history on the device bridge.
//!
//! Returns after the settle delay. Recording and the foreground check never fail
//! the action.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::coords::{ScreenGeometry, device_point};
use crate::core::memory::Memory;
use crate::core::types::{Action, AppTarget, Element, RelativePosition, ScrollDirection};
use crate::io::config::AgentConfig;
use crate::io::device::DeviceBridge;
use crate::io::recorder::{ActionRecord, Recorder};

/// Everything the executor reads or drives for one action.
pub struct ExecContext<'a, D: DeviceBridge, R: Recorder> {
    pub device: &'a D,
    pub recorder: &'a mut R,
    pub memory: &'a Memory,
    pub config: &'a AgentConfig,
    pub app: &'a AppTarget,
    /// Physical screen size after rotation.
    pub device_size: (u32, u32),
    /// Known once the first detection reported a resize ratio.
    pub geometry: Option<ScreenGeometry>,
    /// Foreground package seen before the app was launched (usually the launcher).
    pub baseline_package: Option<&'a str>,
}

/// Execute the tail of the history and record it.
#[instrument(skip_all)]
pub fn execute_last<D: DeviceBridge, R: Recorder>(ctx: &mut ExecContext<'_, D, R>) -> Result<()> {
    let action = ctx
        .memory
        .last_action()
        .cloned()
        .ok_or_else(|| anyhow!("no action to execute"))?;
    let command = perform(ctx, &action)?;
    info!(kind = %action.kind(), %command, "executed action");

    let screenshot = if action.needs_widget() {
        ctx.memory.current_annotated()
    } else {
        ctx.memory.current_screenshot()
    }
    .map(PathBuf::from);
    let record = ActionRecord {
        action,
        command,
        screenshot,
    };
    if let Err(err) = ctx.recorder.record(record) {
        warn!(err = %format!("{err:#}"), "failed to record action");
    }

    relaunch_if_left(ctx);
    Ok(())
}

fn perform<D: DeviceBridge, R: Recorder>(
    ctx: &ExecContext<'_, D, R>,
    action: &Action,
) -> Result<String> {
    let delays = &ctx.config.delays;
    match action {
        Action::Touch {
            target, position, ..
        } => {
            let (x, y) = physical_point(ctx, target, *position)?;
            let command = ctx.device.tap(x, y)?;
            pause(delays.tap_ms);
            Ok(command)
        }
        Action::Input {
            target,
            position,
            text,
            ..
        } => {
            let (x, y) = physical_point(ctx, target, *position)?;
            let tap = ctx.device.tap(x, y)?;
            pause(delays.tap_ms);
            let input = ctx.device.input_text(text)?;
            pause(delays.input_ms);
            Ok(format!("{tap}\n{input}"))
        }
        Action::Scroll { direction, .. } => {
            let command = scroll(ctx, *direction)?;
            pause(delays.scroll_ms);
            Ok(command)
        }
        Action::Back {
            corrective: true, ..
        } => undo_previous(ctx),
        Action::Back { .. } => {
            let command = ctx.device.press_back()?;
            pause(delays.back_ms);
            Ok(command)
        }
        Action::Wait { .. } => {
            pause(delays.wait_ms);
            Ok(format!("sleep {}ms", delays.wait_ms))
        }
        Action::Start { .. } => {
            let command = ctx.device.launch_app(&ctx.app.package, &ctx.app.activity)?;
            pause(delays.launch_ms);
            Ok(command)
        }
        Action::End { .. } => {
            let command = ctx.device.stop_app(&ctx.app.package)?;
            pause(delays.stop_ms);
            Ok(command)
        }
    }
}

/// Undo the action before the corrective back.
fn undo_previous<D: DeviceBridge, R: Recorder>(ctx: &ExecContext<'_, D, R>) -> Result<String> {
    let actions = ctx.memory.actions();
    let previous = actions.len().checked_sub(2).and_then(|index| actions.get(index));
    let delays = &ctx.config.delays;
    let command = match previous {
        Some(Action::Input { text, .. }) => {
            let command = ctx.device.delete_chars(text.chars().count())?;
            pause(delays.input_ms);
            command
        }
        Some(Action::Scroll { direction, .. }) => {
            let command = scroll(ctx, direction.reversed())?;
            pause(delays.scroll_ms);
            command
        }
        Some(_) | None => {
            let command = ctx.device.press_back()?;
            pause(delays.back_ms);
            command
        }
    };
    debug!(%command, "undid previous action");
    Ok(command)
}

fn scroll<D: DeviceBridge, R: Recorder>(
    ctx: &ExecContext<'_, D, R>,
    direction: ScrollDirection,
) -> Result<String> {
    let (from, to) = swipe_path(direction, ctx.device_size);
    ctx.device.swipe(from, to, ctx.config.device.swipe_duration_ms)
}

/// Swipe endpoints that move the content toward `direction`.
pub fn swipe_path(direction: ScrollDirection, size: (u32, u32)) -> ((i32, i32), (i32, i32)) {
    let (width, height) = (f64::from(size.0), f64::from(size.1));
    let at = |x: f64, y: f64| (x as i32, y as i32);
    match direction {
        ScrollDirection::Down => (at(width / 2.0, height * 0.8), at(width / 2.0, height * 0.2)),
        ScrollDirection::Up => (at(width / 2.0, height * 0.2), at(width / 2.0, height * 0.8)),
        ScrollDirection::Right => (at(width * 0.8, height / 2.0), at(width * 0.2, height / 2.0)),
        ScrollDirection::Left => (at(width * 0.2, height / 2.0), at(width * 0.8, height / 2.0)),
    }
}

fn physical_point<D: DeviceBridge, R: Recorder>(
    ctx: &ExecContext<'_, D, R>,
    target: &Element,
    position: RelativePosition,
) -> Result<(i32, i32)> {
    let Some(geometry) = ctx.geometry else {
        bail!("screen geometry unknown before the first detection");
    };
    Ok(device_point(
        &target.bbox,
        position,
        &geometry,
        ctx.config.touch.offsets(),
    ))
}

/// Bring the app back when the last action left it for the baseline app.
fn relaunch_if_left<D: DeviceBridge, R: Recorder>(ctx: &ExecContext<'_, D, R>) {
    let Some(baseline) = ctx.baseline_package else {
        return;
    };
    match ctx.device.current_foreground_app() {
        Ok(foreground) if foreground.package == baseline => {
            warn!(package = %foreground.package, "app left the foreground, relaunching");
            match ctx.device.launch_app(&ctx.app.package, &ctx.app.activity) {
                Ok(_) => pause(ctx.config.delays.launch_ms),
                Err(err) => warn!(err = %format!("{err:#}"), "relaunch failed"),
            }
        }
        Ok(_) => {}
        Err(err) => warn!(err = %format!("{err:#}"), "foreground app query failed"),
    }
}

fn pause(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
