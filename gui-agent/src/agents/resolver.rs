//! Action resolution: turn a decided intent into a concrete, targetable action.
//!
//! Strategies run in order and the first success wins:
//! no-target kinds, literal text match, vision match, missing-widget analysis.
//! Input actions on a detected element then get a focus-position refinement.

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::agents::AgentContext;
use crate::agents::chat::images;
use crate::agents::decider;
use crate::core::answers::{
    INPUT_POSITION_SCHEMA, InputPositionAnswer, LOCATION_SCHEMA, LocationAnswer,
    MISSING_OPTION_SCHEMA, MissingOptionAnswer, MissingWidget, WIDGET_NUMBER_SCHEMA,
    WidgetNumberAnswer, parse_answer,
};
use crate::core::conversation::Stage;
use crate::core::text_match::find_literal_match;
use crate::core::types::{
    Action, DecidedKind, Decision, Element, PREDICTED_ELEMENT_ID, RelativePosition, Situation,
};
use crate::io::oracle::{Oracle, Purpose};
use crate::io::prompt::widget_answer;

pub const UNDETECTED_BUTTON: &str = "undetected_button";
pub const BLANK_FIELD: &str = "blank_field";
const DEFAULT_TARGET: &str = "target widget";

enum Attempt {
    Resolved(Action),
    NeedsPrerequisite,
}

/// Resolve `decision` against the current elements.
///
/// When the oracle says the target only appears after a skipped step, a new intent
/// is requested and resolved again, up to `resolver.max_attempts` times in total.
#[instrument(skip_all, fields(kind = ?decision.kind))]
pub fn resolve<O: Oracle>(ctx: &mut AgentContext<'_, O>, decision: Decision) -> Result<Action> {
    let max_attempts = ctx.config.resolver.max_attempts;
    let mut decision = decision;
    for attempt in 1..=max_attempts {
        match resolve_once(ctx, &decision)? {
            Attempt::Resolved(action) => {
                info!(attempt, kind = %action.kind(), "resolved action");
                return Ok(action);
            }
            Attempt::NeedsPrerequisite if attempt < max_attempts => {
                info!(attempt, "target needs a preliminary action, re-deciding");
                decision = decider::revise_intent(ctx, Situation::MissingPrerequisite, None)?;
            }
            Attempt::NeedsPrerequisite => {}
        }
    }
    bail!("target widget still missing after {max_attempts} resolution attempts")
}

fn resolve_once<O: Oracle>(ctx: &mut AgentContext<'_, O>, decision: &Decision) -> Result<Attempt> {
    match decision.kind {
        DecidedKind::Back => {
            return Ok(Attempt::Resolved(Action::Back {
                intent: decision.intent.clone(),
                corrective: false,
            }));
        }
        DecidedKind::Scroll => {
            let direction = decision
                .scroll_direction
                .ok_or_else(|| anyhow!("scroll decision is missing scroll-direction"))?;
            return Ok(Attempt::Resolved(Action::Scroll {
                intent: decision.intent.clone(),
                direction,
            }));
        }
        DecidedKind::Touch | DecidedKind::Input => {}
    }

    let description = decision
        .target_description
        .clone()
        .unwrap_or_else(|| DEFAULT_TARGET.to_string());
    let is_input = decision.kind == DecidedKind::Input;

    let literal = if ctx.config.resolver.text_match {
        decision
            .target_description
            .as_deref()
            .and_then(|target| find_literal_match(ctx.memory.elements(), target))
            .cloned()
    } else {
        None
    };

    let (element, position) = if let Some(matched) = literal {
        debug!(id = matched.id, "literal text match");
        let prompt = ctx.prompts.confirm_widget()?;
        ctx.chat.record_exchange(
            Stage::ActionDecision,
            prompt,
            images(ctx.memory.current_annotated()),
            widget_answer(matched.id),
        );
        let position = focus_position(ctx, &matched, is_input)?;
        (described(matched, &description), position)
    } else {
        let prompt = ctx.prompts.confirm_widget()?;
        let id = ask_widget_number(ctx, Purpose::MatchWidget, prompt)?;
        if id == i64::from(PREDICTED_ELEMENT_ID) {
            match analyze_missing(ctx)? {
                MissingWidget::NeedsPrerequisite => return Ok(Attempt::NeedsPrerequisite),
                MissingWidget::Undetected => {
                    let prompt = ctx.prompts.predict_location(is_input, None)?;
                    ask_location(ctx, Purpose::PredictLocation, prompt, is_input)?
                }
            }
        } else {
            let element = detected(ctx, id)?;
            let position = focus_position(ctx, &element, is_input)?;
            (described(element, &description), position)
        }
    };

    Ok(Attempt::Resolved(build_action(decision, element, position)?))
}

/// Re-target the last touch/input action after a widget-matching error.
#[instrument(skip_all, fields(kind = %action.kind()))]
pub fn rematch<O: Oracle>(ctx: &mut AgentContext<'_, O>, action: &Action) -> Result<Action> {
    let (intent, target, text) = match action {
        Action::Touch { intent, target, .. } => (intent, target, None),
        Action::Input {
            intent,
            target,
            text,
            ..
        } => (intent, target, Some(text)),
        other => bail!("cannot rematch a {} action", other.kind()),
    };
    let is_input = text.is_some();
    let suggestion = ctx.memory.pop_suggestion();

    let (element, position) = if target.is_predicted() {
        let prompt = ctx.prompts.fix_location(suggestion.as_deref())?;
        ask_location(ctx, Purpose::FixLocation, prompt, is_input)?
    } else {
        let prompt = ctx.prompts.rematch_widget(suggestion.as_deref())?;
        let id = ask_widget_number(ctx, Purpose::RematchWidget, prompt)?;
        if id == i64::from(PREDICTED_ELEMENT_ID) {
            let prompt = ctx.prompts.predict_location(is_input, None)?;
            ask_location(ctx, Purpose::PredictLocation, prompt, is_input)?
        } else {
            let element = detected(ctx, id)?;
            let position = focus_position(ctx, &element, is_input)?;
            let element = Element {
                description: target.description.clone(),
                ..element
            };
            (element, position)
        }
    };

    Ok(match text {
        Some(text) => Action::Input {
            intent: intent.clone(),
            target: element,
            position,
            text: text.clone(),
        },
        None => Action::Touch {
            intent: intent.clone(),
            target: element,
            position,
        },
    })
}

fn build_action(decision: &Decision, target: Element, position: RelativePosition) -> Result<Action> {
    let intent = decision.intent.clone();
    match decision.kind {
        DecidedKind::Touch => Ok(Action::Touch {
            intent,
            target,
            position,
        }),
        DecidedKind::Input => Ok(Action::Input {
            intent,
            target,
            position,
            text: decision
                .input_text
                .clone()
                .ok_or_else(|| anyhow!("input decision is missing input-text"))?,
        }),
        other => bail!("{other:?} actions have no target"),
    }
}

fn described(element: Element, description: &str) -> Element {
    Element {
        description: Some(description.to_string()),
        ..element
    }
}

fn detected<O: Oracle>(ctx: &AgentContext<'_, O>, id: i64) -> Result<Element> {
    i32::try_from(id)
        .ok()
        .and_then(|id| ctx.memory.element(id))
        .cloned()
        .ok_or_else(|| anyhow!("oracle referenced unknown element {id}"))
}

fn ask_widget_number<O: Oracle>(
    ctx: &mut AgentContext<'_, O>,
    purpose: Purpose,
    prompt: String,
) -> Result<i64> {
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::ActionDecision,
        purpose,
        prompt,
        images(ctx.memory.current_annotated()),
    )?;
    let answer: WidgetNumberAnswer =
        parse_answer(&raw, WIDGET_NUMBER_SCHEMA).context("parse target-widget-number")?;
    Ok(answer.number)
}

fn analyze_missing<O: Oracle>(ctx: &mut AgentContext<'_, O>) -> Result<MissingWidget> {
    let prompt = ctx.prompts.analyze_missing()?;
    ctx.chat.fork_scratch(Stage::ActionDecision);
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::Temporary,
        Purpose::AnalyzeMissing,
        prompt,
        Vec::new(),
    );
    ctx.chat.discard_scratch();
    let answer: MissingOptionAnswer =
        parse_answer(&raw?, MISSING_OPTION_SCHEMA).context("parse option-number")?;
    let missing = answer.classify()?;
    info!(?missing, "target widget missing");
    Ok(missing)
}

/// Ask for a location relative to a detected widget and synthesize a predicted target.
fn ask_location<O: Oracle>(
    ctx: &mut AgentContext<'_, O>,
    purpose: Purpose,
    prompt: String,
    is_input: bool,
) -> Result<(Element, RelativePosition)> {
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::ActionDecision,
        purpose,
        prompt,
        images(ctx.memory.current_annotated()),
    )?;
    let answer: LocationAnswer = parse_answer(&raw, LOCATION_SCHEMA).context("parse location")?;
    let anchor = detected(ctx, answer.widget)?;
    let description = if is_input { BLANK_FIELD } else { UNDETECTED_BUTTON };
    info!(anchor = anchor.id, position = ?answer.position, description, "predicted target");
    Ok((Element::predicted(&anchor, description), answer.position))
}

/// Focus position for input targets; touch targets use the center.
fn focus_position<O: Oracle>(
    ctx: &mut AgentContext<'_, O>,
    element: &Element,
    is_input: bool,
) -> Result<RelativePosition> {
    if !is_input {
        return Ok(RelativePosition::Center);
    }
    let prompt = ctx.prompts.input_position(element.id)?;
    ctx.chat.fork_scratch(Stage::ActionDecision);
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::Temporary,
        Purpose::InputPosition,
        prompt,
        images(ctx.memory.current_annotated()),
    );
    ctx.chat.discard_scratch();
    match parse_answer::<InputPositionAnswer>(&raw?, INPUT_POSITION_SCHEMA) {
        Ok(answer) => Ok(answer.position),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "unusable input position, touching the field itself");
            Ok(RelativePosition::Center)
        }
    }
}
