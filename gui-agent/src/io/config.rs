//! Agent configuration stored as TOML (default `gui-agent.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::coords::TouchOffsets;

/// Agent configuration (TOML).
///
/// Edited by humans. Missing fields default to the values the agent was tuned with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub limits: LimitsConfig,
    pub resolver: ResolverConfig,
    pub touch: TouchConfig,
    pub delays: DelayConfig,
    pub oracle: CommandConfig,
    pub detector: CommandConfig,
    pub device: DeviceConfig,
    pub recorder: RecorderConfig,
}

/// Caps on the three session failure counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub loading_wait_limit: u32,
    pub match_error_limit: u32,
    pub decide_error_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            loading_wait_limit: 3,
            match_error_limit: 3,
            decide_error_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Try literal text matching before asking the oracle to pick a widget.
    pub text_match: bool,
    /// Resolution attempts when a missing widget needs a prerequisite action.
    pub max_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            text_match: true,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TouchConfig {
    pub x_offset: i32,
    pub y_offset: i32,
}

impl Default for TouchConfig {
    fn default() -> Self {
        let offsets = TouchOffsets::default();
        Self {
            x_offset: offsets.dx,
            y_offset: offsets.dy,
        }
    }
}

impl TouchConfig {
    pub fn offsets(&self) -> TouchOffsets {
        TouchOffsets {
            dx: self.x_offset,
            dy: self.y_offset,
        }
    }
}

/// Settle delays after device operations, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DelayConfig {
    pub tap_ms: u64,
    pub input_ms: u64,
    pub scroll_ms: u64,
    pub back_ms: u64,
    pub wait_ms: u64,
    pub launch_ms: u64,
    pub stop_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            tap_ms: 2_000,
            input_ms: 1_000,
            scroll_ms: 1_000,
            back_ms: 500,
            wait_ms: 2_000,
            launch_ms: 5_000,
            stop_ms: 500,
        }
    }
}

impl DelayConfig {
    /// All delays zeroed, for scripted runs.
    pub fn none() -> Self {
        Self {
            tap_ms: 0,
            input_ms: 0,
            scroll_ms: 0,
            back_ms: 0,
            wait_ms: 0,
            launch_ms: 0,
            stop_ms: 0,
        }
    }
}

/// External process adapter (oracle or detector).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandConfig {
    /// Command and arguments, e.g. `["python3", "oracle.py"]`.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("{name}.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("{name}.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Runs require a configured command; `init`/`check-config` do not.
    pub fn require_command(&self, name: &str) -> Result<(&str, &[String])> {
        match self.command.split_first() {
            Some((program, args)) if !program.trim().is_empty() => Ok((program, args)),
            _ => Err(anyhow!("{name}.command must be a non-empty array")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub adb: String,
    pub serial: Option<String>,
    /// Local directory for pulled screenshots.
    pub screenshot_dir: PathBuf,
    /// Device-side path `screencap` writes to.
    pub remote_screenshot: String,
    pub command_timeout_secs: u64,
    pub swipe_duration_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb: "adb".to_string(),
            serial: None,
            screenshot_dir: PathBuf::from("data/screenshots"),
            remote_screenshot: "/sdcard/gui-agent-screen.png".to_string(),
            command_timeout_secs: 30,
            swipe_duration_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecorderConfig {
    pub script_dir: PathBuf,
    pub chat_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from("data/scripts"),
            chat_dir: PathBuf::from("data/chats"),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("limits.loading_wait_limit", self.limits.loading_wait_limit),
            ("limits.match_error_limit", self.limits.match_error_limit),
            ("limits.decide_error_limit", self.limits.decide_error_limit),
            ("resolver.max_attempts", self.resolver.max_attempts),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        if self.touch.x_offset < 0 || self.touch.y_offset < 0 {
            return Err(anyhow!("touch offsets must be >= 0"));
        }
        self.oracle.validate("oracle")?;
        self.detector.validate("detector")?;
        if self.device.adb.trim().is_empty() {
            return Err(anyhow!("device.adb must be non-empty"));
        }
        if self.device.command_timeout_secs == 0 {
            return Err(anyhow!("device.command_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("gui-agent.toml");
        let cfg = AgentConfig {
            oracle: CommandConfig {
                command: vec!["python3".to_string(), "oracle.py".to_string()],
                ..CommandConfig::default()
            },
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gui-agent.toml");
        fs::write(
            &path,
            "[limits]\nmatch_error_limit = 5\n\n[device]\nserial = \"emulator-5554\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.limits.match_error_limit, 5);
        assert_eq!(cfg.limits.loading_wait_limit, 3);
        assert_eq!(cfg.device.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(cfg.touch.offsets(), TouchOffsets { dx: 40, dy: 60 });
    }

    #[test]
    fn zero_limits_are_rejected() {
        let cfg = AgentConfig {
            limits: LimitsConfig {
                decide_error_limit: 0,
                ..LimitsConfig::default()
            },
            ..AgentConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("decide_error_limit"));
    }

    #[test]
    fn require_command_reports_missing_command() {
        let cfg = AgentConfig::default();
        assert!(cfg.oracle.require_command("oracle").is_err());
    }
}
