//! Shared deterministic types for the session core.
//!
//! These types are the contracts between the state machine, the resolver and the
//! executor. They carry no I/O and serialize to the stable shapes used in run reports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element id reserved for a synthesized "predicted position" target.
pub const PREDICTED_ELEMENT_ID: i32 = -1;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum State {
    Uninitialized,
    Initialized,
    Observing,
    Executing,
    LoadChecking,
    EffectChecking,
    EndChecking,
    Correcting,
    End,
    Failed,
    Error,
}

impl State {
    /// `END`, `FAILED` and `ERROR` absorb every further `step()`.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::End | State::Failed | State::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Uninitialized => "UNINITIALIZED",
            State::Initialized => "INITIALIZED",
            State::Observing => "OBSERVING",
            State::Executing => "EXECUTING",
            State::LoadChecking => "LOAD-CHECKING",
            State::EffectChecking => "EFFECT-CHECKING",
            State::EndChecking => "END-CHECKING",
            State::Correcting => "CORRECTING",
            State::End => "END",
            State::Failed => "FAILED",
            State::Error => "ERROR",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The application under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppTarget {
    pub name: String,
    pub package: String,
    /// Launch activity, e.g. `.MainActivity`.
    pub activity: String,
}

/// Where to touch relative to a target's bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativePosition {
    #[default]
    #[serde(rename = "self")]
    Center,
    Up,
    Down,
    Left,
    Right,
}

impl RelativePosition {
    /// Parse an oracle-provided token, accepting surrounding whitespace and any case.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "self" => Some(Self::Center),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Detector-space bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub column_min: i32,
    pub row_min: i32,
    pub column_max: i32,
    pub row_max: i32,
}

impl BoundingBox {
    pub fn new(column_min: i32, row_min: i32, column_max: i32, row_max: i32) -> Self {
        Self {
            column_min,
            row_min,
            column_max,
            row_max,
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (
            (self.column_min + self.column_max) / 2,
            (self.row_min + self.row_max) / 2,
        )
    }
}

/// A detected (or predicted) widget on the current screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: i32,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<i32>,
}

impl Element {
    /// Synthesize a target the detector missed, anchored on `anchor`'s geometry.
    pub fn predicted(anchor: &Element, description: &str) -> Self {
        Self {
            id: PREDICTED_ELEMENT_ID,
            bbox: anchor.bbox,
            text: None,
            description: Some(description.to_string()),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_predicted(&self) -> bool {
        self.id == PREDICTED_ELEMENT_ID
    }

    pub fn describe(&self) -> &str {
        self.description.as_deref().unwrap_or("target widget")
    }
}

/// Kind tag shared by [`Action`] and its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Touch,
    Input,
    Scroll,
    Back,
    Wait,
    Start,
    End,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Touch => "touch",
            ActionKind::Input => "input",
            ActionKind::Scroll => "scroll",
            ActionKind::Back => "back",
            ActionKind::Wait => "wait",
            ActionKind::Start => "start",
            ActionKind::End => "end",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete device action. Memory's history is the only owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action-type", rename_all = "lowercase")]
pub enum Action {
    Touch {
        intent: String,
        #[serde(rename = "target-widget")]
        target: Element,
        position: RelativePosition,
    },
    Input {
        intent: String,
        #[serde(rename = "target-widget")]
        target: Element,
        position: RelativePosition,
        #[serde(rename = "input-text")]
        text: String,
    },
    Scroll {
        intent: String,
        #[serde(rename = "scroll-direction")]
        direction: ScrollDirection,
    },
    Back {
        intent: String,
        /// Set when the back undoes an action that led to an unrelated page.
        #[serde(rename = "need-back", default)]
        corrective: bool,
    },
    Wait {
        intent: String,
    },
    Start {
        intent: String,
    },
    End {
        intent: String,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Touch { .. } => ActionKind::Touch,
            Action::Input { .. } => ActionKind::Input,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::Back { .. } => ActionKind::Back,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Start { .. } => ActionKind::Start,
            Action::End { .. } => ActionKind::End,
        }
    }

    pub fn intent(&self) -> &str {
        match self {
            Action::Touch { intent, .. }
            | Action::Input { intent, .. }
            | Action::Scroll { intent, .. }
            | Action::Back { intent, .. }
            | Action::Wait { intent }
            | Action::Start { intent }
            | Action::End { intent } => intent,
        }
    }

    pub fn target(&self) -> Option<&Element> {
        match self {
            Action::Touch { target, .. } | Action::Input { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Whether the action addresses a widget (touch and input).
    pub fn needs_widget(&self) -> bool {
        self.target().is_some()
    }

    pub fn is_corrective_back(&self) -> bool {
        matches!(self, Action::Back { corrective: true, .. })
    }

    pub fn wait(intent: impl Into<String>) -> Self {
        Action::Wait {
            intent: intent.into(),
        }
    }

    pub fn corrective_back() -> Self {
        Action::Back {
            intent: "return to the page before the previous action".to_string(),
            corrective: true,
        }
    }
}

/// Why an executed action produced no useful effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Situation {
    WidgetMismatch,
    MissingPrerequisite,
    AppBug,
    ScenarioMismatch,
}

impl Situation {
    pub const ALL: [Situation; 4] = [
        Situation::WidgetMismatch,
        Situation::MissingPrerequisite,
        Situation::AppBug,
        Situation::ScenarioMismatch,
    ];

    pub fn from_number(number: i64) -> Option<Self> {
        match number {
            1 => Some(Self::WidgetMismatch),
            2 => Some(Self::MissingPrerequisite),
            3 => Some(Self::AppBug),
            4 => Some(Self::ScenarioMismatch),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::WidgetMismatch => 1,
            Self::MissingPrerequisite => 2,
            Self::AppBug => 3,
            Self::ScenarioMismatch => 4,
        }
    }

    /// Fixed corrective context passed back to the decision layer.
    pub fn description(self) -> &'static str {
        match self {
            Self::WidgetMismatch => "error occurred in matching target widget with its number",
            Self::MissingPrerequisite => {
                "necessary preliminary action was neglected causing the app to not respond correctly"
            }
            Self::AppBug => "the selected action triggered the bug of the app",
            Self::ScenarioMismatch => "the selected action doesn't correspond to the task scenario",
        }
    }
}

/// Action kinds the decision layer is allowed to choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecidedKind {
    Touch,
    Input,
    Scroll,
    Back,
}

/// Structured oracle answer describing the next intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub intent: String,
    pub kind: DecidedKind,
    pub target_description: Option<String>,
    pub input_text: Option<String>,
    pub scroll_direction: Option<ScrollDirection>,
}

impl Decision {
    pub fn touch(intent: &str, target: &str) -> Self {
        Self {
            intent: intent.to_string(),
            kind: DecidedKind::Touch,
            target_description: Some(target.to_string()),
            input_text: None,
            scroll_direction: None,
        }
    }

    pub fn input(intent: &str, target: &str, text: &str) -> Self {
        Self {
            input_text: Some(text.to_string()),
            kind: DecidedKind::Input,
            ..Self::touch(intent, target)
        }
    }

    pub fn needs_widget(&self) -> bool {
        matches!(self.kind, DecidedKind::Touch | DecidedKind::Input)
    }
}
