//! Per-session working memory: screenshots, detected elements, action history and
//! pending suggestions.
//!
//! Memory enforces bookkeeping invariants only. It never decides anything.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::core::types::{Action, Element};

#[derive(Debug, Clone, Default)]
pub struct Memory {
    actions: Vec<Action>,
    suggestions: Vec<String>,
    facts: BTreeMap<String, String>,
    initial_screenshot: Option<PathBuf>,
    previous_screenshot: Option<PathBuf>,
    current_screenshot: Option<PathBuf>,
    previous_annotated: Option<PathBuf>,
    current_annotated: Option<PathBuf>,
    cached_screenshot: Option<PathBuf>,
    elements: Vec<Element>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_facts(&mut self, facts: BTreeMap<String, String>) {
        self.facts = facts;
    }

    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(String::as_str)
    }

    /// `- key: value` lines, or `None` when no private facts were given.
    pub fn describe_facts(&self) -> Option<String> {
        if self.facts.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .facts
            .iter()
            .map(|(key, value)| format!("- {key}: {value}"))
            .collect();
        Some(lines.join("\n"))
    }

    pub fn cache_screenshot(&mut self, path: PathBuf) {
        self.cached_screenshot = Some(path);
    }

    pub fn cached_screenshot(&self) -> Option<&Path> {
        self.cached_screenshot.as_deref()
    }

    /// Promote a screenshot to `current`. The first save also fills `initial`.
    pub fn save_screenshot(&mut self, path: PathBuf) {
        if self.initial_screenshot.is_none() {
            self.initial_screenshot = Some(path.clone());
            self.current_screenshot = Some(path);
            return;
        }
        self.previous_screenshot = self.current_screenshot.take();
        self.current_screenshot = Some(path);
    }

    pub fn save_annotated(&mut self, path: PathBuf) {
        if self.current_annotated.is_some() {
            self.previous_annotated = self.current_annotated.take();
        }
        self.current_annotated = Some(path);
    }

    pub fn initial_screenshot(&self) -> Option<&Path> {
        self.initial_screenshot.as_deref()
    }

    pub fn previous_screenshot(&self) -> Option<&Path> {
        self.previous_screenshot.as_deref()
    }

    pub fn current_screenshot(&self) -> Option<&Path> {
        self.current_screenshot.as_deref()
    }

    pub fn previous_annotated(&self) -> Option<&Path> {
        self.previous_annotated.as_deref()
    }

    pub fn current_annotated(&self) -> Option<&Path> {
        self.current_annotated.as_deref()
    }

    /// Replace the element set with a fresh detection result.
    pub fn set_elements(&mut self, elements: Vec<Element>) {
        self.elements = elements;
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: i32) -> Option<&Element> {
        self.elements.iter().find(|element| element.id == id)
    }

    pub fn push_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn remove_last_action(&mut self) -> Option<Action> {
        self.actions.pop()
    }

    /// Swap the history tail for a corrected action.
    pub fn replace_last_action(&mut self, action: Action) -> Result<Action> {
        let Some(previous) = self.actions.pop() else {
            bail!("no action to replace");
        };
        self.actions.push(action);
        Ok(previous)
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn push_suggestion(&mut self, suggestion: impl Into<String>) {
        let suggestion = suggestion.into();
        if !suggestion.trim().is_empty() {
            self.suggestions.push(suggestion);
        }
    }

    /// Consume the most recent suggestion.
    pub fn pop_suggestion(&mut self) -> Option<String> {
        self.suggestions.pop()
    }

    pub fn pending_suggestions(&self) -> usize {
        self.suggestions.len()
    }

    /// Numbered history for prompts, one action per line.
    pub fn describe_actions(&self) -> String {
        if self.actions.is_empty() {
            return "No actions".to_string();
        }
        self.actions
            .iter()
            .enumerate()
            .map(|(index, action)| format!("{} - {}", index + 1, describe_action(action)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn describe_last_action(&self) -> String {
        self.actions.last().map(describe_action).unwrap_or_default()
    }
}

/// One-sentence rendering of an action for prompts.
pub fn describe_action(action: &Action) -> String {
    let intent = lower_first(action.intent());
    match action {
        Action::Touch { target, .. } => format!("touch the {} to {intent}", target.describe()),
        Action::Input { target, text, .. } => format!(
            "input in the {} with text ```{text}``` to {intent}",
            target.describe()
        ),
        Action::Scroll { .. } => format!("scroll the screen to {intent}"),
        Action::Back { .. } => format!("navigate back to {intent}"),
        Action::Wait { .. } => intent,
        Action::Start { .. } | Action::End { .. } => String::new(),
    }
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
