//! Device bridge abstraction and the adb-backed implementation.
//!
//! Every operation returns the command string as executed so the executor can
//! attach it to the action record.

use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument};

use crate::io::config::DeviceConfig;
use crate::io::process::run_command_with_timeout;

const ADB_OUTPUT_LIMIT_BYTES: usize = 4_000_000;
const KEYCODE_BACK: &str = "4";
const KEYCODE_DEL: &str = "KEYCODE_DEL";
const INPUT_SPECIAL_CHARS: [char; 6] = ['\'', '?', '&', '#', '<', '>'];

static FOCUSED_APP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"mFocusedApp=.*?\s([A-Za-z0-9_.]+)/([A-Za-z0-9_.$]+)").expect("focused app regex")
});
static WM_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Physical|Override) size:\s*(\d+)x(\d+)").expect("wm size regex")
});

/// Package and activity of the app currently holding focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundApp {
    pub package: String,
    pub activity: String,
}

pub trait DeviceBridge {
    fn tap(&self, x: i32, y: i32) -> Result<String>;
    fn input_text(&self, text: &str) -> Result<String>;
    fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u64) -> Result<String>;
    fn press_back(&self) -> Result<String>;
    fn delete_chars(&self, count: usize) -> Result<String>;
    fn launch_app(&self, package: &str, activity: &str) -> Result<String>;
    fn stop_app(&self, package: &str) -> Result<String>;
    /// Capture the screen into a fresh local file.
    fn capture_screenshot(&self) -> Result<PathBuf>;
    fn current_foreground_app(&self) -> Result<ForegroundApp>;
    fn screen_size(&self) -> Result<(u32, u32)>;
}

/// Bridge that drives an Android device through `adb`.
pub struct AdbBridge {
    config: DeviceConfig,
    shots: Cell<u32>,
}

impl AdbBridge {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            shots: Cell::new(0),
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.adb);
        if let Some(serial) = &self.config.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd
    }

    fn rendered(&self, args: &[&str]) -> String {
        let mut parts = vec![self.config.adb.clone()];
        if let Some(serial) = &self.config.serial {
            parts.push("-s".to_string());
            parts.push(serial.clone());
        }
        parts.extend(args.iter().map(|arg| arg.to_string()));
        parts.join(" ")
    }

    /// Run `adb [-s serial] <args...>` and return (rendered command, stdout).
    fn run(&self, args: &[&str]) -> Result<(String, String)> {
        let rendered = self.rendered(args);
        let mut cmd = self.base_command();
        cmd.args(args);
        debug!(command = %rendered, "adb");
        let output = run_command_with_timeout(
            cmd,
            None,
            Duration::from_secs(self.config.command_timeout_secs),
            ADB_OUTPUT_LIMIT_BYTES,
        )
        .with_context(|| format!("run {rendered}"))?;
        output.ensure_success(&rendered)?;
        Ok((rendered, output.stdout_text()))
    }

    fn shell(&self, command: &str) -> Result<String> {
        self.run(&["shell", command]).map(|(rendered, _)| rendered)
    }
}

impl DeviceBridge for AdbBridge {
    fn tap(&self, x: i32, y: i32) -> Result<String> {
        self.shell(&format!("input tap {x} {y}"))
    }

    fn input_text(&self, text: &str) -> Result<String> {
        if text.is_empty() {
            return Ok("input blank string".to_string());
        }
        self.shell(&format!("input text \"{}\"", escape_input_text(text)))
    }

    fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: u64) -> Result<String> {
        self.shell(&format!(
            "input swipe {} {} {} {} {duration_ms}",
            from.0, from.1, to.0, to.1
        ))
    }

    fn press_back(&self) -> Result<String> {
        self.shell(&format!("input keyevent {KEYCODE_BACK}"))
    }

    fn delete_chars(&self, count: usize) -> Result<String> {
        if count == 0 {
            return Ok("delete nothing".to_string());
        }
        let keys = vec![KEYCODE_DEL; count].join(" ");
        self.shell(&format!("input keyevent {keys}"))
    }

    fn launch_app(&self, package: &str, activity: &str) -> Result<String> {
        self.shell(&format!("am start {package}/{activity}"))
    }

    fn stop_app(&self, package: &str) -> Result<String> {
        self.shell(&format!("am force-stop {package}"))
    }

    #[instrument(skip_all)]
    fn capture_screenshot(&self) -> Result<PathBuf> {
        let dir = &self.config.screenshot_dir;
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let index = self.shots.get() + 1;
        self.shots.set(index);
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let local = dir.join(format!("screenshot-{stamp}-{index:04}.png"));
        let remote = self.config.remote_screenshot.as_str();

        self.shell(&format!("screencap -p {remote}"))?;
        let local_arg = local.display().to_string();
        self.run(&["pull", remote, &local_arg])?;
        if !local.is_file() {
            return Err(anyhow!("screenshot was not pulled to {}", local.display()));
        }
        Ok(local)
    }

    fn current_foreground_app(&self) -> Result<ForegroundApp> {
        let (_, stdout) = self.run(&["shell", "dumpsys", "window"])?;
        parse_focused_app(&stdout).ok_or_else(|| anyhow!("no mFocusedApp in dumpsys output"))
    }

    fn screen_size(&self) -> Result<(u32, u32)> {
        let (_, stdout) = self.run(&["shell", "wm", "size"])?;
        parse_wm_size(&stdout).ok_or_else(|| anyhow!("unrecognized `wm size` output"))
    }
}

/// Escape text for `adb shell input text`.
pub fn escape_input_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => escaped.push_str("%s"),
            '"' => escaped.push_str("\\'"),
            c if INPUT_SPECIAL_CHARS.contains(&c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Extract the focused package/activity from `dumpsys window`.
pub fn parse_focused_app(dumpsys: &str) -> Option<ForegroundApp> {
    let caps = FOCUSED_APP_RE.captures(dumpsys)?;
    Some(ForegroundApp {
        package: caps[1].to_string(),
        activity: caps[2].to_string(),
    })
}

/// Parse `wm size`, preferring an override size over the physical one.
pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    let mut override_size = None;
    for caps in WM_SIZE_RE.captures_iter(output) {
        let size = (caps[2].parse().ok()?, caps[3].parse().ok()?);
        if &caps[1] == "Override" {
            override_size = Some(size);
        } else {
            physical = Some(size);
        }
    }
    override_size.or(physical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_spaces_quotes_and_shell_characters() {
        assert_eq!(escape_input_text("hello world"), "hello%sworld");
        assert_eq!(escape_input_text("say \"hi\""), "say%s\\'hi\\'");
        assert_eq!(escape_input_text("a&b?c#d<e>f'g"), "a\\&b\\?c\\#d\\<e\\>f\\'g");
        assert_eq!(escape_input_text("plain"), "plain");
    }

    #[test]
    fn parses_focused_app_from_dumpsys() {
        let dumpsys = "  mFocusedApp=ActivityRecord{3a1b2c u0 com.android.launcher3/.uioverrides.QuickstepLauncher t12}\n";
        assert_eq!(
            parse_focused_app(dumpsys),
            Some(ForegroundApp {
                package: "com.android.launcher3".to_string(),
                activity: ".uioverrides.QuickstepLauncher".to_string(),
            })
        );
        assert_eq!(parse_focused_app("mCurrentFocus=null"), None);
    }

    #[test]
    fn prefers_override_screen_size() {
        assert_eq!(parse_wm_size("Physical size: 1080x2340\n"), Some((1080, 2340)));
        assert_eq!(
            parse_wm_size("Physical size: 1080x2340\nOverride size: 720x1560\n"),
            Some((720, 1560))
        );
        assert_eq!(parse_wm_size("error: no devices"), None);
    }

    #[test]
    fn rendered_command_includes_serial() {
        let bridge = AdbBridge::new(DeviceConfig {
            serial: Some("emulator-5554".to_string()),
            ..DeviceConfig::default()
        });
        assert_eq!(
            bridge.rendered(&["shell", "input tap 1 2"]),
            "adb -s emulator-5554 shell input tap 1 2"
        );
    }
}
