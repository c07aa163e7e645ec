//! Stage-keyed oracle conversations with archiving and scratch forks.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Oracle context a question belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ActionDecision,
    LoadingCheck,
    EndingCheck,
    VisualChangeCheck,
    ValidChangeCheck,
    /// Single-use fork of another stage.
    Temporary,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ActionDecision => "action-decision",
            Stage::LoadingCheck => "loading-check",
            Stage::EndingCheck => "ending-check",
            Stage::VisualChangeCheck => "visual-change-check",
            Stage::ValidChangeCheck => "valid-change-check",
            Stage::Temporary => "temporary",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PathBuf>,
}

/// Append-only log for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Keep the first system prompt a conversation was given.
    pub fn set_system(&mut self, text: impl Into<String>) {
        if self.system.is_none() {
            self.system = Some(text.into());
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>, images: Vec<PathBuf>) {
        self.messages.push(Message {
            role: Role::User,
            text: text.into(),
            images,
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message {
            role: Role::Assistant,
            text: text.into(),
            images: Vec::new(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_none() && self.messages.is_empty()
    }

    fn render(&self, out: &mut String) {
        if let Some(system) = &self.system {
            out.push_str("[system]\n");
            out.push_str(system);
            out.push('\n');
        }
        for message in &self.messages {
            let label = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            out.push_str(&format!("[{label}]\n{}\n", message.text));
            for image in &message.images {
                out.push_str(&format!("  <image {}>\n", image.display()));
            }
        }
    }
}

/// Every conversation of a session, live and archived.
#[derive(Debug, Clone, Default)]
pub struct ConversationPool {
    live: BTreeMap<Stage, Conversation>,
    archive: Vec<(Stage, Conversation)>,
}

impl ConversationPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive the live conversation for `stage` and start it empty.
    pub fn reset(&mut self, stage: Stage) {
        if let Some(previous) = self.live.remove(&stage)
            && !previous.is_empty()
        {
            self.archive.push((stage, previous));
        }
    }

    pub fn get(&self, stage: Stage) -> Option<&Conversation> {
        self.live.get(&stage)
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut Conversation {
        self.live.entry(stage).or_default()
    }

    pub fn snapshot(&self, stage: Stage) -> Conversation {
        self.live.get(&stage).cloned().unwrap_or_default()
    }

    pub fn restore(&mut self, stage: Stage, conversation: Conversation) {
        self.live.insert(stage, conversation);
    }

    /// Replace the scratch context with a copy of `from`.
    pub fn fork_scratch(&mut self, from: Stage) {
        self.discard_scratch();
        let copy = self.snapshot(from);
        self.live.insert(Stage::Temporary, copy);
    }

    pub fn discard_scratch(&mut self) {
        self.reset(Stage::Temporary);
    }

    pub fn archived(&self) -> usize {
        self.archive.len()
    }

    /// Plain-text rendering of every archived then live conversation.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        let live = self.live.iter().map(|(stage, conv)| (*stage, conv));
        let archived = self.archive.iter().map(|(stage, conv)| (*stage, conv));
        for (stage, conversation) in archived.chain(live) {
            if conversation.is_empty() {
                continue;
            }
            out.push_str(&format!("===== {stage} =====\n"));
            conversation.render(&mut out);
            out.push('\n');
        }
        out
    }
}
