//! Oracle conversations for one session, with token accounting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::conversation::{ConversationPool, Stage};
use crate::io::oracle::{Oracle, OracleRequest, Purpose};
use crate::io::recorder::TokenUsage;

#[derive(Debug, Default)]
pub struct Chat {
    pool: ConversationPool,
    usage: TokenUsage,
    questions: u32,
}

impl Chat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, stage: Stage) {
        self.pool.reset(stage);
    }

    pub fn set_system(&mut self, stage: Stage, text: impl Into<String>) {
        self.pool.get_mut(stage).set_system(text);
    }

    /// Add a user turn and an empty reply without asking, to lay out context.
    pub fn seed(&mut self, stage: Stage, text: impl Into<String>, images: Vec<PathBuf>) {
        let conversation = self.pool.get_mut(stage);
        conversation.push_user(text, images);
        conversation.push_assistant("");
    }

    /// Record an exchange whose answer is already known.
    pub fn record_exchange(
        &mut self,
        stage: Stage,
        text: impl Into<String>,
        images: Vec<PathBuf>,
        answer: impl Into<String>,
    ) {
        let conversation = self.pool.get_mut(stage);
        conversation.push_user(text, images);
        conversation.push_assistant(answer);
    }

    /// Append a user turn, ask the oracle, and append its answer.
    pub fn ask<O: Oracle>(
        &mut self,
        oracle: &O,
        stage: Stage,
        purpose: Purpose,
        text: impl Into<String>,
        images: Vec<PathBuf>,
    ) -> Result<String> {
        self.pool.get_mut(stage).push_user(text, images);
        let reply = {
            let conversation = self.pool.get_mut(stage);
            oracle
                .ask(&OracleRequest {
                    stage,
                    purpose,
                    conversation,
                })
                .with_context(|| format!("ask oracle ({stage}, {purpose})"))?
        };
        self.questions += 1;
        self.usage.tokens_in += reply.tokens_in;
        self.usage.tokens_out += reply.tokens_out;
        info!(
            %stage,
            %purpose,
            tokens_in = reply.tokens_in,
            tokens_out = reply.tokens_out,
            "oracle answered"
        );
        debug!(raw = %reply.text, "oracle raw answer");
        self.pool.get_mut(stage).push_assistant(reply.text.clone());
        Ok(reply.text)
    }

    pub fn fork_scratch(&mut self, from: Stage) {
        self.pool.fork_scratch(from);
    }

    pub fn discard_scratch(&mut self) {
        self.pool.discard_scratch();
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn questions(&self) -> u32 {
        self.questions
    }

    pub fn pool(&self) -> &ConversationPool {
        &self.pool
    }

    pub fn transcript(&self) -> String {
        self.pool.transcript()
    }
}

/// Attach an optional screenshot as an image list.
pub fn images(path: Option<&Path>) -> Vec<PathBuf> {
    path.map(Path::to_path_buf).into_iter().collect()
}
