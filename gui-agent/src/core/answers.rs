//! Typed oracle answers, validated against embedded JSON Schemas.
//!
//! Each answer goes through the same pipeline: extract the first JSON object from the
//! raw text, validate it (Draft 2020-12), then deserialize into the typed shape.
//! Any failure is a protocol violation the state machine turns into `ERROR`.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::extract::extract_json;
use crate::core::types::{DecidedKind, Decision, RelativePosition, ScrollDirection, Situation};

pub const DECISION_SCHEMA: &str = include_str!("../../schemas/decision.schema.json");
pub const WIDGET_NUMBER_SCHEMA: &str = include_str!("../../schemas/widget_number.schema.json");
pub const MISSING_OPTION_SCHEMA: &str = include_str!("../../schemas/missing_option.schema.json");
pub const LOCATION_SCHEMA: &str = include_str!("../../schemas/location.schema.json");
pub const INPUT_POSITION_SCHEMA: &str = include_str!("../../schemas/input_position.schema.json");
pub const SITUATION_SCHEMA: &str = include_str!("../../schemas/situation.schema.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionAnswer {
    pub intent: String,
    #[serde(rename = "action-type")]
    pub action_type: DecidedKind,
    #[serde(rename = "target-widget", default)]
    pub target_widget: Option<String>,
    #[serde(rename = "input-text", default)]
    pub input_text: Option<String>,
    #[serde(rename = "scroll-direction", default)]
    pub scroll_direction: Option<String>,
}

impl TryFrom<DecisionAnswer> for Decision {
    type Error = anyhow::Error;

    fn try_from(answer: DecisionAnswer) -> Result<Self> {
        let scroll_direction = match answer.scroll_direction.as_deref() {
            Some(raw) => Some(
                ScrollDirection::parse(raw)
                    .ok_or_else(|| anyhow!("invalid scroll-direction {raw:?}"))?,
            ),
            None => None,
        };
        match answer.action_type {
            DecidedKind::Input if answer.input_text.is_none() => {
                bail!("input decision is missing input-text")
            }
            DecidedKind::Scroll if scroll_direction.is_none() => {
                bail!("scroll decision is missing scroll-direction")
            }
            _ => {}
        }
        let target_description = answer
            .target_widget
            .map(|target| target.trim().to_string())
            .filter(|target| !target.is_empty());
        Ok(Decision {
            intent: answer.intent,
            kind: answer.action_type,
            target_description,
            input_text: answer.input_text,
            scroll_direction,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WidgetNumberAnswer {
    #[serde(rename = "target-widget-number", deserialize_with = "integer_like")]
    pub number: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MissingOptionAnswer {
    #[serde(rename = "option-number", deserialize_with = "integer_like")]
    pub option: i64,
}

/// Why the decided target is absent from the detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingWidget {
    /// A prerequisite action was skipped.
    NeedsPrerequisite,
    /// The detector missed the widget.
    Undetected,
}

impl MissingOptionAnswer {
    pub fn classify(self) -> Result<MissingWidget> {
        match self.option {
            1 => Ok(MissingWidget::NeedsPrerequisite),
            2 => Ok(MissingWidget::Undetected),
            other => bail!("option-number {other} is not 1 or 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LocationAnswer {
    #[serde(rename = "widget-number", deserialize_with = "integer_like")]
    pub widget: i64,
    pub position: RelativePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct InputPositionAnswer {
    pub position: RelativePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SituationAnswer {
    #[serde(rename = "situation-number", deserialize_with = "integer_like")]
    pub number: i64,
}

impl SituationAnswer {
    pub fn situation(self) -> Result<Situation> {
        Situation::from_number(self.number)
            .ok_or_else(|| anyhow!("situation-number {} is outside 1..=4", self.number))
    }
}

/// Extract, validate and deserialize one structured answer.
pub fn parse_answer<T: DeserializeOwned>(raw: &str, schema: &str) -> Result<T> {
    let value = extract_json(raw).ok_or_else(|| anyhow!("no JSON object in oracle answer"))?;
    let schema_json: Value = serde_json::from_str(schema).context("parse answer schema")?;
    validate_schema(&value, &schema_json)?;
    serde_json::from_value(value).context("deserialize oracle answer")
}

pub fn parse_decision(raw: &str) -> Result<Decision> {
    let answer: DecisionAnswer = parse_answer(raw, DECISION_SCHEMA)?;
    Decision::try_from(answer)
}

/// Validate JSON instance against a JSON Schema (Draft 2020-12).
pub fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Oracles answer ids both as `4` and `"4"`.
fn integer_like<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("{number} is not an integer"))),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("{text:?} is not an integer"))),
        other => Err(de::Error::custom(format!("{other} is not an integer"))),
    }
}
