//! Scenario files (TOML): which app to drive and what to accomplish in it.
//!
//! ```toml
//! [app]
//! name = "Notes"
//! package = "com.example.notes"
//! activity = ".MainActivity"
//!
//! [scenario]
//! name = "create-note"
//! description = "Create a note titled Groceries"
//! rotation = 0
//!
//! [scenario.facts]
//! requirement = "the note list shows Groceries"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::core::coords::Rotation;
use crate::core::types::AppTarget;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    pub app: AppTarget,
    pub scenario: ScenarioSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSpec {
    /// Short identifier used in artifact file names.
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub rotation: Rotation,
    /// Private facts (credentials, expected values) shown to the oracle verbatim.
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
}

impl ScenarioFile {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("app.name", &self.app.name),
            ("app.package", &self.app.package),
            ("app.activity", &self.app.activity),
            ("scenario.name", &self.scenario.name),
            ("scenario.description", &self.scenario.description),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                bail!("{field} must be non-empty");
            }
        }
        Ok(())
    }
}

pub fn load_scenario(path: &Path) -> Result<ScenarioFile> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let scenario: ScenarioFile =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    scenario
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(scenario)
}
