//! Decision layer: asks the oracle what to do next.
//!
//! Shared by the observing cycle (fresh intent) and by the resolver and classifier
//! (revised intent under a corrective context).

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::AgentContext;
use crate::agents::chat::images;
use crate::core::answers::parse_decision;
use crate::core::conversation::Stage;
use crate::core::types::{Decision, Situation};
use crate::io::oracle::{Oracle, Purpose};

/// Start a fresh decision cycle: the action-decision conversation is reset.
#[instrument(skip_all)]
pub fn next_intent<O: Oracle>(ctx: &mut AgentContext<'_, O>) -> Result<Decision> {
    let system = ctx.with_task(|task| ctx.prompts.decision_system(task))?;
    let history = (!ctx.memory.actions().is_empty()).then(|| ctx.memory.describe_actions());
    let prompt = ctx.prompts.next_action(history.as_deref())?;

    ctx.chat.reset(Stage::ActionDecision);
    ctx.chat.set_system(Stage::ActionDecision, system);
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::ActionDecision,
        Purpose::NextAction,
        prompt,
        images(ctx.memory.current_screenshot()),
    )?;
    let decision = parse_decision(&raw).context("parse next action decision")?;
    info!(intent = %decision.intent, kind = ?decision.kind, "decided next intent");
    Ok(decision)
}

/// Ask for a different intent in the ongoing decision conversation.
#[instrument(skip_all, fields(situation = situation.number()))]
pub fn revise_intent<O: Oracle>(
    ctx: &mut AgentContext<'_, O>,
    situation: Situation,
    suggestion: Option<&str>,
) -> Result<Decision> {
    let prompt = ctx
        .prompts
        .revise_action(situation.description(), suggestion)?;
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::ActionDecision,
        Purpose::ReviseAction,
        prompt,
        images(ctx.memory.current_screenshot()),
    )?;
    let decision = parse_decision(&raw).context("parse revised action decision")?;
    info!(intent = %decision.intent, kind = ?decision.kind, "revised intent");
    Ok(decision)
}
