//! Screen checks: loading, effect of the last action, and task completion.
//!
//! Each check starts its conversation from scratch and answers with a flag.
//! An answer that is neither flag value is an error.

use anyhow::{Result, anyhow};
use tracing::{info, instrument};

use crate::agents::AgentContext;
use crate::agents::chat::images;
use crate::core::conversation::Stage;
use crate::core::extract::{FlagVocabulary, parse_flag};
use crate::io::oracle::{Oracle, Purpose};
use crate::io::prompt::{CURRENT_SCREEN, INITIAL_SCREEN, PREVIOUS_SCREEN};

/// Outcome of checking the last executed action against the screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectVerdict {
    Valid,
    /// The app did not respond as intended. `page_changed` means it moved somewhere
    /// else, and the action has to be undone before correcting it.
    Invalid { page_changed: bool },
}

/// Whether the freshly captured screen is still loading.
#[instrument(skip_all)]
pub fn check_loading<O: Oracle>(ctx: &mut AgentContext<'_, O>) -> Result<bool> {
    let system = ctx.prompts.loading_system()?;
    let prompt = ctx.prompts.loading_check()?;
    ctx.chat.reset(Stage::LoadingCheck);
    ctx.chat.set_system(Stage::LoadingCheck, system);
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::LoadingCheck,
        Purpose::LoadingCheck,
        prompt,
        images(ctx.memory.cached_screenshot()),
    )?;
    let loading = flag(&raw, FlagVocabulary::TrueFalse, Purpose::LoadingCheck)?;
    info!(loading, "loading check");
    Ok(loading)
}

/// Compare the screens around the last action.
#[instrument(skip_all)]
pub fn check_effect<O: Oracle>(ctx: &mut AgentContext<'_, O>) -> Result<EffectVerdict> {
    let system = ctx.prompts.effect_system()?;
    let last_action = ctx.memory.describe_last_action();
    let prompt = ctx.with_task(|task| ctx.prompts.valid_change(task, &last_action))?;

    ctx.chat.reset(Stage::ValidChangeCheck);
    ctx.chat.set_system(Stage::ValidChangeCheck, system);
    ctx.chat.seed(Stage::ValidChangeCheck, prompt, Vec::new());
    ctx.chat.seed(
        Stage::ValidChangeCheck,
        INITIAL_SCREEN,
        images(ctx.memory.initial_screenshot()),
    );
    ctx.chat.seed(
        Stage::ValidChangeCheck,
        PREVIOUS_SCREEN,
        images(ctx.memory.current_screenshot()),
    );
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::ValidChangeCheck,
        Purpose::ValidChange,
        CURRENT_SCREEN,
        images(ctx.memory.cached_screenshot()),
    )?;
    if flag(&raw, FlagVocabulary::YesNo, Purpose::ValidChange)? {
        info!("action took effect");
        return Ok(EffectVerdict::Valid);
    }

    let page_changed = check_page_change(ctx)?;
    info!(page_changed, "action did not take effect");
    Ok(EffectVerdict::Invalid { page_changed })
}

fn check_page_change<O: Oracle>(ctx: &mut AgentContext<'_, O>) -> Result<bool> {
    let prompt = ctx.prompts.page_change()?;
    ctx.chat.reset(Stage::VisualChangeCheck);
    ctx.chat.seed(Stage::VisualChangeCheck, prompt, Vec::new());
    ctx.chat.seed(
        Stage::VisualChangeCheck,
        PREVIOUS_SCREEN,
        images(ctx.memory.current_screenshot()),
    );
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::VisualChangeCheck,
        Purpose::PageChange,
        CURRENT_SCREEN,
        images(ctx.memory.cached_screenshot()),
    )?;
    flag(&raw, FlagVocabulary::YesNo, Purpose::PageChange)
}

/// Whether the scenario is accomplished, judged from the screens and the history.
///
/// Like the effect check, "previous" is the screen the last action was decided on and
/// "current" is the capture taken after it ran.
#[instrument(skip_all)]
pub fn check_end<O: Oracle>(ctx: &mut AgentContext<'_, O>) -> Result<bool> {
    let system = ctx.with_task(|task| ctx.prompts.ending_system(task))?;
    let history = ctx.memory.describe_actions();
    let prompt = ctx
        .prompts
        .ending_check(ctx.scenario, ctx.memory.fact("requirement"), &history)?;

    ctx.chat.reset(Stage::EndingCheck);
    ctx.chat.set_system(Stage::EndingCheck, system);
    ctx.chat.seed(
        Stage::EndingCheck,
        INITIAL_SCREEN,
        images(ctx.memory.initial_screenshot()),
    );
    ctx.chat.seed(
        Stage::EndingCheck,
        PREVIOUS_SCREEN,
        images(ctx.memory.current_screenshot()),
    );
    ctx.chat.seed(
        Stage::EndingCheck,
        CURRENT_SCREEN,
        images(ctx.memory.cached_screenshot()),
    );
    let raw = ctx.chat.ask(
        ctx.oracle,
        Stage::EndingCheck,
        Purpose::EndCheck,
        prompt,
        Vec::new(),
    )?;
    let done = flag(&raw, FlagVocabulary::TrueFalse, Purpose::EndCheck)?;
    info!(done, "end check");
    Ok(done)
}

fn flag(raw: &str, vocabulary: FlagVocabulary, purpose: Purpose) -> Result<bool> {
    parse_flag(raw, vocabulary)
        .ok_or_else(|| anyhow!("indeterminate {purpose} answer: {}", raw.trim()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::agents::chat::Chat;
    use crate::core::conversation::Role;
    use crate::core::memory::Memory;
    use crate::core::types::AppTarget;
    use crate::io::config::AgentConfig;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::ScriptedOracle;

    fn run<T>(
        oracle: &ScriptedOracle,
        memory: &mut Memory,
        chat: &mut Chat,
        check: impl FnOnce(&mut AgentContext<'_, ScriptedOracle>) -> T,
    ) -> T {
        let prompts = PromptEngine::new().expect("prompts");
        let app = AppTarget {
            name: "Notes".to_string(),
            package: "com.example.notes".to_string(),
            activity: ".Main".to_string(),
        };
        let config = AgentConfig::default();
        let mut ctx = AgentContext {
            oracle,
            prompts: &prompts,
            chat,
            memory,
            app: &app,
            scenario: "create a note",
            config: &config,
        };
        check(&mut ctx)
    }

    fn screens() -> Memory {
        let mut memory = Memory::new();
        memory.save_screenshot(PathBuf::from("shot-0.png"));
        memory.cache_screenshot(PathBuf::from("shot-1.png"));
        memory
    }

    #[test]
    fn loading_check_reads_true_false() {
        let oracle = ScriptedOracle::new().answer(Purpose::LoadingCheck, "answer: T\nreason: spinner");
        let mut memory = screens();
        let mut chat = Chat::new();
        let loading = run(&oracle, &mut memory, &mut chat, |ctx| check_loading(ctx)).expect("check");
        assert!(loading);
        let conversation = chat.pool().snapshot(Stage::LoadingCheck);
        assert_eq!(
            conversation.messages[0].images,
            vec![PathBuf::from("shot-1.png")]
        );
    }

    #[test]
    fn indeterminate_answer_is_an_error() {
        let oracle = ScriptedOracle::new().answer(Purpose::LoadingCheck, "hard to say");
        let mut memory = screens();
        let mut chat = Chat::new();
        let err = run(&oracle, &mut memory, &mut chat, |ctx| check_loading(ctx)).unwrap_err();
        assert!(err.to_string().contains("indeterminate"));
    }

    /// Verifies the effect check lays out initial, previous and current screens in order.
    #[test]
    fn valid_effect_skips_page_change_check() {
        let oracle = ScriptedOracle::new().answer(Purpose::ValidChange, "answer: YES\nreason: ok");
        let mut memory = screens();
        let mut chat = Chat::new();
        let verdict = run(&oracle, &mut memory, &mut chat, |ctx| check_effect(ctx)).expect("check");
        assert_eq!(verdict, EffectVerdict::Valid);
        assert_eq!(oracle.asked_for(Purpose::PageChange), 0);

        let conversation = chat.pool().snapshot(Stage::ValidChangeCheck);
        let users: Vec<_> = conversation
            .messages
            .iter()
            .filter(|message| message.role == Role::User)
            .collect();
        assert_eq!(users.len(), 4);
        assert_eq!(users[1].text, INITIAL_SCREEN);
        assert_eq!(users[2].text, PREVIOUS_SCREEN);
        assert_eq!(users[3].text, CURRENT_SCREEN);
        assert_eq!(users[3].images, vec![PathBuf::from("shot-1.png")]);
    }

    #[test]
    fn invalid_effect_reports_page_change() {
        let oracle = ScriptedOracle::new()
            .answer(Purpose::ValidChange, "answer: NO")
            .answer(Purpose::PageChange, "answer: YES");
        let mut memory = screens();
        let mut chat = Chat::new();
        let verdict = run(&oracle, &mut memory, &mut chat, |ctx| check_effect(ctx)).expect("check");
        assert_eq!(verdict, EffectVerdict::Invalid { page_changed: true });
    }

    #[test]
    fn end_check_includes_requirement_fact() {
        let oracle = ScriptedOracle::new().answer(Purpose::EndCheck, "answer: F\nreason: not yet");
        let mut memory = screens();
        memory.set_facts([("requirement".to_string(), "title is Groceries".to_string())].into());
        let mut chat = Chat::new();
        let done = run(&oracle, &mut memory, &mut chat, |ctx| check_end(ctx)).expect("check");
        assert!(!done);
        let prompt = oracle.last_prompt(Purpose::EndCheck).expect("prompt");
        assert!(prompt.contains("Requirement: title is Groceries"));
        assert!(prompt.contains("No actions"));
    }

    /// Verifies the end check judges the screen captured after the last action.
    #[test]
    fn end_check_compares_decided_and_captured_screens() {
        let oracle = ScriptedOracle::new().answer(Purpose::EndCheck, "answer: T");
        let mut memory = screens();
        let mut chat = Chat::new();
        assert!(run(&oracle, &mut memory, &mut chat, |ctx| check_end(ctx)).expect("check"));

        let conversation = chat.pool().snapshot(Stage::EndingCheck);
        let turn = |text: &str| {
            conversation
                .messages
                .iter()
                .find(|message| message.text == text)
                .map(|message| message.images.clone())
                .expect("seeded turn")
        };
        assert_eq!(turn(INITIAL_SCREEN), vec![PathBuf::from("shot-0.png")]);
        assert_eq!(turn(PREVIOUS_SCREEN), vec![PathBuf::from("shot-0.png")]);
        assert_eq!(turn(CURRENT_SCREEN), vec![PathBuf::from("shot-1.png")]);
    }
}
