//! Widget detector abstraction and its process-backed adapter.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::types::{Element, PREDICTED_ELEMENT_ID};
use crate::io::config::CommandConfig;
use crate::io::process::run_command_with_timeout;

/// Result of one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Screenshot with numbered boxes drawn on it.
    pub annotated: PathBuf,
    /// Detector-space size divided by device size.
    pub resize_ratio: f64,
    pub elements: Vec<Element>,
}

impl Detection {
    /// Reject results the resolver could not address unambiguously.
    pub fn validate(&self) -> Result<()> {
        if !(self.resize_ratio.is_finite() && self.resize_ratio > 0.0) {
            bail!("detector resize_ratio must be positive, got {}", self.resize_ratio);
        }
        let mut seen = BTreeSet::new();
        for element in &self.elements {
            if element.id == PREDICTED_ELEMENT_ID {
                bail!("detector used reserved element id {PREDICTED_ELEMENT_ID}");
            }
            if !seen.insert(element.id) {
                bail!("detector returned duplicate element id {}", element.id);
            }
        }
        Ok(())
    }
}

pub trait Detector {
    fn detect(&self, screenshot: &Path) -> Result<Detection>;
}

/// Runs `<command...> <screenshot>` and parses a [`Detection`] from stdout.
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    config: CommandConfig,
}

impl CommandDetector {
    pub fn from_config(config: &CommandConfig) -> Result<Self> {
        let (program, args) = config.require_command("detector")?;
        Ok(Self {
            program: program.to_string(),
            args: args.to_vec(),
            config: config.clone(),
        })
    }
}

impl Detector for CommandDetector {
    #[instrument(skip_all, fields(screenshot = %screenshot.display()))]
    fn detect(&self, screenshot: &Path) -> Result<Detection> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(screenshot);
        let output = run_command_with_timeout(
            cmd,
            None,
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .context("run detector command")?;
        output.ensure_success("detector command")?;

        let detection: Detection = serde_json::from_slice(&output.stdout)
            .context("parse detector output")?;
        detection.validate()?;
        info!(
            elements = detection.elements.len(),
            resize_ratio = detection.resize_ratio,
            "detection finished"
        );
        Ok(detection)
    }
}
