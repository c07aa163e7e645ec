//! Prompt rendering for every oracle question the agent asks.
//!
//! Templates live beside this module as Markdown and are compiled into the binary.
//! Wording is not a contract; only the answer templates' JSON keys are.

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};

const TEMPLATES: &[(&str, &str)] = &[
    ("decision_system", include_str!("prompts/decision_system.md")),
    ("next_action", include_str!("prompts/next_action.md")),
    ("revise_action", include_str!("prompts/revise_action.md")),
    ("confirm_widget", include_str!("prompts/confirm_widget.md")),
    ("analyze_missing", include_str!("prompts/analyze_missing.md")),
    ("input_position", include_str!("prompts/input_position.md")),
    ("predict_location", include_str!("prompts/predict_location.md")),
    ("rematch_widget", include_str!("prompts/rematch_widget.md")),
    ("fix_location", include_str!("prompts/fix_location.md")),
    ("analyze_situation", include_str!("prompts/analyze_situation.md")),
    ("loading_system", include_str!("prompts/loading_system.md")),
    ("loading_check", include_str!("prompts/loading_check.md")),
    ("effect_system", include_str!("prompts/effect_system.md")),
    ("valid_change", include_str!("prompts/valid_change.md")),
    ("page_change", include_str!("prompts/page_change.md")),
    ("ending_system", include_str!("prompts/ending_system.md")),
    ("ending_check", include_str!("prompts/ending_check.md")),
];

pub const INITIAL_SCREEN: &str = "This is the initial GUI screen.";
pub const PREVIOUS_SCREEN: &str = "This is the previous GUI screen.";
pub const CURRENT_SCREEN: &str = "This is the current GUI screen.";

/// Session facts shared by several prompts.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub app_name: &'a str,
    pub scenario: &'a str,
    pub facts: Option<&'a str>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("compile prompt template {name}"))?;
        }
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load prompt template {name}"))?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render prompt template {name}"))?;
        Ok(rendered.trim().to_string())
    }

    pub fn decision_system(&self, task: &TaskContext<'_>) -> Result<String> {
        self.render(
            "decision_system",
            context! {
                app_name => task.app_name,
                scenario => task.scenario,
                facts => task.facts,
            },
        )
    }

    /// `history` is `None` before the first action.
    pub fn next_action(&self, history: Option<&str>) -> Result<String> {
        self.render("next_action", context! { history => history })
    }

    pub fn revise_action(&self, situation: &str, suggestion: Option<&str>) -> Result<String> {
        self.render(
            "revise_action",
            context! { situation => situation, suggestion => suggestion },
        )
    }

    pub fn confirm_widget(&self) -> Result<String> {
        self.render("confirm_widget", context! {})
    }

    pub fn analyze_missing(&self) -> Result<String> {
        self.render("analyze_missing", context! {})
    }

    pub fn input_position(&self, widget_id: i32) -> Result<String> {
        self.render("input_position", context! { widget_id => widget_id })
    }

    pub fn predict_location(&self, input: bool, suggestion: Option<&str>) -> Result<String> {
        self.render(
            "predict_location",
            context! { input => input, suggestion => suggestion },
        )
    }

    pub fn rematch_widget(&self, suggestion: Option<&str>) -> Result<String> {
        self.render("rematch_widget", context! { suggestion => suggestion })
    }

    pub fn fix_location(&self, suggestion: Option<&str>) -> Result<String> {
        self.render("fix_location", context! { suggestion => suggestion })
    }

    pub fn analyze_situation(&self, need_back: bool) -> Result<String> {
        self.render("analyze_situation", context! { need_back => need_back })
    }

    pub fn loading_system(&self) -> Result<String> {
        self.render("loading_system", context! {})
    }

    pub fn loading_check(&self) -> Result<String> {
        self.render("loading_check", context! {})
    }

    pub fn effect_system(&self) -> Result<String> {
        self.render("effect_system", context! {})
    }

    pub fn valid_change(&self, task: &TaskContext<'_>, last_action: &str) -> Result<String> {
        self.render(
            "valid_change",
            context! {
                app_name => task.app_name,
                scenario => task.scenario,
                last_action => last_action,
            },
        )
    }

    pub fn page_change(&self) -> Result<String> {
        self.render("page_change", context! {})
    }

    pub fn ending_system(&self, task: &TaskContext<'_>) -> Result<String> {
        self.render(
            "ending_system",
            context! {
                app_name => task.app_name,
                scenario => task.scenario,
                facts => task.facts,
            },
        )
    }

    pub fn ending_check(
        &self,
        scenario: &str,
        requirement: Option<&str>,
        history: &str,
    ) -> Result<String> {
        self.render(
            "ending_check",
            context! {
                scenario => scenario,
                requirement => requirement,
                history => history,
            },
        )
    }
}

/// Assistant turn recorded when a target was matched without asking the oracle.
pub fn widget_answer(widget_id: i32) -> String {
    format!("Widget: {{\"target-widget-number\": {widget_id}}}")
}
