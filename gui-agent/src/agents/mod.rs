//! Oracle-backed roles the session delegates to.
//!
//! Each role is a set of functions over an [`AgentContext`], the slice of session
//! state a single question needs. Roles never change the session state themselves.

use crate::core::memory::Memory;
use crate::core::types::AppTarget;
use crate::io::config::AgentConfig;
use crate::io::oracle::Oracle;
use crate::io::prompt::{PromptEngine, TaskContext};

pub mod chat;
pub mod classifier;
pub mod decider;
pub mod executor;
pub mod resolver;
pub mod supervisor;

use chat::Chat;

/// Borrowed view of the session for one role invocation.
pub struct AgentContext<'a, O: Oracle> {
    pub oracle: &'a O,
    pub prompts: &'a PromptEngine,
    pub chat: &'a mut Chat,
    pub memory: &'a mut Memory,
    pub app: &'a AppTarget,
    pub scenario: &'a str,
    pub config: &'a AgentConfig,
}

impl<O: Oracle> AgentContext<'_, O> {
    /// Render a prompt that needs the task description and private facts.
    pub(crate) fn with_task<T>(&self, render: impl FnOnce(&TaskContext<'_>) -> T) -> T {
        let facts = self.memory.describe_facts();
        render(&TaskContext {
            app_name: &self.app.name,
            scenario: self.scenario,
            facts: facts.as_deref(),
        })
    }
}
