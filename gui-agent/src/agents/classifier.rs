//! Correction: explain why the last action failed and replace it.

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::agents::{AgentContext, decider, resolver};
use crate::core::answers::{SITUATION_SCHEMA, SituationAnswer, parse_answer};
use crate::core::budget::SessionBudgets;
use crate::core::conversation::Stage;
use crate::core::extract::extract_reason;
use crate::core::types::Situation;
use crate::io::oracle::{Oracle, Purpose};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// The last history entry was replaced and should be executed.
    Replaced(Situation),
    /// The budget for this situation ran out.
    Exhausted(Situation),
}

/// Ask which of the four situations explains the ineffective action.
///
/// Runs on a scratch copy of the decision conversation, text only: the screens are
/// already in that context. The attached reason is kept as a suggestion for the
/// follow-up question.
#[instrument(skip_all, fields(need_back = need_back))]
pub fn classify<O: Oracle>(ctx: &mut AgentContext<'_, O>, need_back: bool) -> Result<Situation> {
    let prompt = ctx.prompts.analyze_situation(need_back)?;
    ctx.chat.fork_scratch(Stage::ActionDecision);
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::Temporary,
        Purpose::AnalyzeSituation,
        prompt,
        Vec::new(),
    );
    ctx.chat.discard_scratch();
    let raw = raw?;

    let answer: SituationAnswer =
        parse_answer(&raw, SITUATION_SCHEMA).context("parse situation-number")?;
    let situation = answer.situation()?;
    match extract_reason(&raw) {
        Some(reason) => ctx.memory.push_suggestion(reason),
        None => warn!("situation answer carried no reason"),
    }
    info!(situation = situation.number(), "classified ineffective action");
    Ok(situation)
}

/// Replace the last action according to the classified situation.
///
/// A pending rematch failure forces another rematch without asking.
#[instrument(skip_all, fields(need_back = need_back))]
pub fn correct<O: Oracle>(
    ctx: &mut AgentContext<'_, O>,
    budgets: &mut SessionBudgets,
    need_back: bool,
) -> Result<CorrectionOutcome> {
    let mut situation = if budgets.matching.count() > 0 {
        Situation::WidgetMismatch
    } else {
        classify(ctx, need_back)?
    };

    let last = ctx
        .memory
        .last_action()
        .cloned()
        .ok_or_else(|| anyhow!("no action to correct"))?;
    if situation == Situation::WidgetMismatch && !last.needs_widget() {
        warn!(kind = %last.kind(), "widget mismatch on an action without target, re-deciding");
        situation = Situation::ScenarioMismatch;
    }

    let replacement = if situation == Situation::WidgetMismatch {
        if budgets.matching.bump() {
            warn!(count = budgets.matching.count(), "widget match budget exhausted");
            return Ok(CorrectionOutcome::Exhausted(situation));
        }
        resolver::rematch(ctx, &last)?
    } else {
        if budgets.deciding.bump() {
            warn!(count = budgets.deciding.count(), "decision budget exhausted");
            return Ok(CorrectionOutcome::Exhausted(situation));
        }
        let suggestion = ctx.memory.pop_suggestion();
        let decision = decider::revise_intent(ctx, situation, suggestion.as_deref())?;
        resolver::resolve(ctx, decision)?
    };

    info!(situation = situation.number(), kind = %replacement.kind(), "replaced last action");
    ctx.memory.replace_last_action(replacement)?;
    Ok(CorrectionOutcome::Replaced(situation))
}
