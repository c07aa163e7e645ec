//! Whole-session scenarios driven through scripted collaborators.
//!
//! Each test scripts the oracle per question purpose, steps a real [`Session`] and
//! checks the terminal state, history and recorded artifacts.

use std::collections::BTreeMap;

use gui_agent::agents::resolver::{BLANK_FIELD, UNDETECTED_BUTTON};
use gui_agent::core::coords::Rotation;
use gui_agent::core::conversation::Stage;
use gui_agent::core::types::{Action, AppTarget, BoundingBox, Element, RelativePosition, State};
use gui_agent::io::oracle::Purpose;
use gui_agent::looping::{LoopStop, run_to_completion};
use gui_agent::session::Session;
use gui_agent::test_support::{
    FakeDevice, MemoryRecorder, ScriptedDetector, ScriptedOracle, TestWorkspace, element,
    text_element,
};

type TestSession = Session<ScriptedOracle, ScriptedDetector, FakeDevice, MemoryRecorder>;

const TOUCH_ADD_NOTE: &str =
    r#"Next action: {"intent": "Open a new note", "action-type": "touch", "target-widget": "Add note"}"#;
const INPUT_TITLE: &str = r#"Next action: {"intent": "Type the title", "action-type": "input", "target-widget": "Title", "input-text": "Groceries"}"#;
const NOT_LOADING: &str = "answer: F\nreason: page is ready";
const LOADING: &str = "answer: T\nreason: spinner";
const EFFECT_OK: &str = "answer: YES\nreason: page changed as intended";
const EFFECT_BAD: &str = "answer: NO\nreason: nothing happened";
const NOT_DONE: &str = "answer: F\nreason: title missing";
const DONE: &str = "answer: T\nreason: note saved";

fn app() -> AppTarget {
    AppTarget {
        name: "Notes".to_string(),
        package: "com.example.notes".to_string(),
        activity: ".Main".to_string(),
    }
}

fn bbox7() -> BoundingBox {
    BoundingBox::new(100, 200, 300, 260)
}

fn screen_elements() -> Vec<Element> {
    vec![
        text_element(0, "Add note", BoundingBox::new(0, 0, 100, 50)),
        text_element(3, "Title", BoundingBox::new(0, 100, 400, 150)),
        element(7, bbox7()),
    ]
}

fn started(workspace: &TestWorkspace, oracle: ScriptedOracle, device: FakeDevice) -> TestSession {
    let mut session = Session::new(
        workspace.config(),
        oracle,
        ScriptedDetector::fixed(screen_elements()),
        device,
        MemoryRecorder::default(),
    )
    .expect("session");
    session
        .initialize(app(), "create a note titled Groceries", BTreeMap::new(), Rotation::Deg0)
        .expect("initialize");
    session
}

fn no_waits(session: &TestSession) -> bool {
    !session
        .memory()
        .actions()
        .iter()
        .any(|action| matches!(action, Action::Wait { .. }))
}

/// Two-step happy path: touch, then input, then the end check succeeds.
#[test]
fn two_step_scenario_ends_with_two_actions() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = ScriptedOracle::new()
        .answers(Purpose::NextAction, &[TOUCH_ADD_NOTE, INPUT_TITLE])
        .answer(Purpose::InputPosition, r#"Position: {"position": "self"}"#)
        .answer(Purpose::LoadingCheck, NOT_LOADING)
        .answer(Purpose::ValidChange, EFFECT_OK)
        .answers(Purpose::EndCheck, &[NOT_DONE, DONE]);
    let mut session = started(&workspace, oracle, FakeDevice::new());

    let outcome = run_to_completion(&mut session, 20, |_, _| {}).expect("run");

    assert_eq!(outcome.stop, LoopStop::End);
    assert_eq!(outcome.ticks, 3);
    assert_eq!(session.state(), State::End);
    let actions = session.memory().actions();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].target().map(|target| target.id), Some(0));
    assert!(matches!(&actions[1], Action::Input { text, .. } if text == "Groceries"));

    assert_eq!(
        session.device().commands(),
        vec![
            "launch com.example.notes/.Main".to_string(),
            "tap 50 25".to_string(),
            "tap 200 125".to_string(),
            "text Groceries".to_string(),
        ]
    );
    let recorder = session.recorder();
    assert_eq!(recorder.records.len(), 2);
    assert_eq!(recorder.reports.len(), 1);
    let report = &recorder.reports[0];
    assert_eq!(report.state, State::End);
    assert_eq!(report.history.len(), 2);
    assert_eq!(report.resize_ratio, Some(1.0));
    assert_eq!(report.device_width, Some(1080));
    assert!(report.usage.tokens_in > 0);
    assert!(report.transcript.contains("===== action-decision ====="));
}

/// A page that keeps loading gets three waits, then the effect is checked anyway.
#[test]
fn loading_loop_is_bounded_and_waits_leave_no_trace() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = ScriptedOracle::new()
        .answer(Purpose::NextAction, TOUCH_ADD_NOTE)
        .answers(Purpose::LoadingCheck, &[LOADING, LOADING, LOADING, LOADING, LOADING])
        .answer(Purpose::ValidChange, EFFECT_OK)
        .answer(Purpose::EndCheck, DONE);
    let mut session = started(&workspace, oracle, FakeDevice::new());

    let mut states = Vec::new();
    while !session.state().is_terminal() {
        states.push(session.step());
        assert!(no_waits(&session), "wait action left in history");
        assert!(states.len() < 20, "session did not terminate");
    }

    assert_eq!(
        states,
        vec![
            State::Executing,
            State::LoadChecking,
            State::LoadChecking,
            State::LoadChecking,
            State::End,
        ]
    );
    assert_eq!(session.oracle().asked_for(Purpose::LoadingCheck), 3);
    assert_eq!(session.budgets().loading.count(), 0);
    let waits = session
        .recorder()
        .records
        .iter()
        .filter(|record| record.command.starts_with("sleep "))
        .count();
    assert_eq!(waits, 3);
    assert_eq!(session.memory().actions().len(), 1);
}

/// The effect never shows and every analysis blames widget matching.
#[test]
fn widget_matching_exhaustion_fails_the_session() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = ScriptedOracle::new()
        .answer(Purpose::NextAction, TOUCH_ADD_NOTE)
        .answer(Purpose::LoadingCheck, NOT_LOADING)
        .answer(Purpose::ValidChange, EFFECT_BAD)
        .answer(Purpose::PageChange, "answer: NO")
        .answer(
            Purpose::AnalyzeSituation,
            "Situation: {\"situation-number\": 1}\nReason: the plus icon is widget 7",
        )
        .answer(Purpose::RematchWidget, r#"Widget: {"target-widget-number": 7}"#);
    let mut session = started(&workspace, oracle, FakeDevice::new());

    let outcome = run_to_completion(&mut session, 20, |_, _| {}).expect("run");

    assert_eq!(outcome.stop, LoopStop::Failed);
    assert_eq!(session.budgets().matching.count(), 3);
    assert_eq!(session.oracle().asked_for(Purpose::AnalyzeSituation), 1);
    assert_eq!(session.oracle().asked_for(Purpose::RematchWidget), 2);
    let report = session.report().expect("report");
    assert_eq!(report.state, State::Failed);
    assert_eq!(report.history.len(), 1);
    assert!(report.reason.as_deref().is_some_and(|reason| !reason.is_empty()));
    assert_eq!(session.recorder().reports.len(), 1);
    // The rematched target keeps the description of the original decision.
    let target = report.history[0].target().expect("target");
    assert_eq!(target.id, 7);
    assert_eq!(target.description.as_deref(), Some("Add note"));
}

fn missing_widget_oracle(next_action: &str) -> ScriptedOracle {
    ScriptedOracle::new()
        .answer(Purpose::NextAction, next_action)
        .answer(Purpose::MatchWidget, r#"Widget: {"target-widget-number": -1}"#)
        .answer(Purpose::AnalyzeMissing, r#"Option: {"option-number": 2}"#)
        .answer(
            Purpose::PredictLocation,
            r#"Location: {"widget-number": 7, "position": "right"}"#,
        )
}

/// An undetected button is predicted next to a detected anchor.
#[test]
fn missing_button_is_predicted_from_anchor() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = missing_widget_oracle(
        r#"{"intent": "Open the cart", "action-type": "touch", "target-widget": "cart button"}"#,
    );
    let mut session = started(&workspace, oracle, FakeDevice::new());

    assert_eq!(session.step(), State::Executing);

    match session.memory().last_action().expect("action") {
        Action::Touch {
            target, position, ..
        } => {
            assert_eq!(target.id, -1);
            assert_eq!(target.description.as_deref(), Some(UNDETECTED_BUTTON));
            assert_eq!(target.bbox, bbox7());
            assert_eq!(*position, RelativePosition::Right);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn missing_field_is_predicted_as_blank_field() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = missing_widget_oracle(
        r#"{"intent": "Enter quantity", "action-type": "input", "target-widget": "quantity box", "input-text": "2"}"#,
    );
    let mut session = started(&workspace, oracle, FakeDevice::new());

    assert_eq!(session.step(), State::Executing);

    let target = session
        .memory()
        .last_action()
        .and_then(Action::target)
        .expect("target");
    assert!(target.is_predicted());
    assert_eq!(target.description.as_deref(), Some(BLANK_FIELD));
    assert_eq!(target.bbox, bbox7());
    // Predicted fields skip the focus-position question.
    assert_eq!(session.oracle().asked_for(Purpose::InputPosition), 0);
}

/// Repeated wrong decisions with page changes end in FAILED after three re-decisions.
#[test]
fn wrong_decisions_terminate_with_corrective_backs() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = ScriptedOracle::new()
        .answer(Purpose::NextAction, TOUCH_ADD_NOTE)
        .answer(Purpose::ReviseAction, TOUCH_ADD_NOTE)
        .answer(Purpose::LoadingCheck, NOT_LOADING)
        .answer(Purpose::ValidChange, EFFECT_BAD)
        .answer(Purpose::PageChange, "answer: YES")
        .answer(
            Purpose::AnalyzeSituation,
            "Situation: {\"situation-number\": 4}\nReason: the task needs the menu first",
        );
    let mut session = started(&workspace, oracle, FakeDevice::new());

    let outcome = run_to_completion(&mut session, 30, |_, _| {}).expect("run");

    assert_eq!(outcome.stop, LoopStop::Failed);
    assert_eq!(session.budgets().deciding.count(), 3);
    assert_eq!(session.memory().actions().len(), 1);
    assert!(!session.memory().actions()[0].is_corrective_back());
    let backs = session
        .device()
        .commands()
        .iter()
        .filter(|command| command.as_str() == "back")
        .count();
    assert_eq!(backs, 3);
    assert_eq!(session.oracle().asked_for(Purpose::ReviseAction), 2);
}

/// An element id outside the detection is a protocol failure.
#[test]
fn unknown_element_id_ends_in_error_with_report() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = ScriptedOracle::new()
        .answer(
            Purpose::NextAction,
            r#"{"intent": "Open settings", "action-type": "touch", "target-widget": "gear"}"#,
        )
        .answer(Purpose::MatchWidget, r#"{"target-widget-number": 42}"#);
    let mut session = started(&workspace, oracle, FakeDevice::new());

    assert_eq!(session.step(), State::Error);
    let report = session.report().expect("report");
    assert!(
        report
            .reason
            .as_deref()
            .is_some_and(|reason| reason.contains("unknown element 42"))
    );
    // Terminal states are sticky and side-effect free.
    let asked = session.oracle().asked();
    assert_eq!(session.step(), State::Error);
    assert_eq!(session.oracle().asked(), asked);
    assert_eq!(session.recorder().reports.len(), 1);
}

#[test]
fn step_before_initialize_does_nothing() {
    let workspace = TestWorkspace::new().expect("workspace");
    let mut session = Session::new(
        workspace.config(),
        ScriptedOracle::new(),
        ScriptedDetector::fixed(Vec::new()),
        FakeDevice::new(),
        MemoryRecorder::default(),
    )
    .expect("session");
    assert_eq!(session.step(), State::Uninitialized);
    assert!(session.device().commands().is_empty());
    assert_eq!(session.device().captures(), 0);
}

#[test]
fn second_initialize_is_a_no_op() {
    let workspace = TestWorkspace::new().expect("workspace");
    let mut session = started(&workspace, ScriptedOracle::new(), FakeDevice::new());
    session
        .initialize(app(), "something else", BTreeMap::new(), Rotation::Deg180)
        .expect("second initialize");
    assert_eq!(session.state(), State::Initialized);
    assert_eq!(
        session.device().commands(),
        vec!["launch com.example.notes/.Main".to_string()]
    );
}

/// Landscape runs rotate screenshots and swap the device size once.
#[test]
fn rotated_session_swaps_device_size() {
    let workspace = TestWorkspace::new().expect("workspace");
    let device = FakeDevice::new().with_screenshot_dir(workspace.path());
    let oracle = ScriptedOracle::new()
        .answer(Purpose::NextAction, TOUCH_ADD_NOTE)
        .answer(Purpose::MatchWidget, r#"{"target-widget-number": 42}"#);
    let mut session = Session::new(
        workspace.config(),
        oracle,
        ScriptedDetector::fixed(Vec::new()),
        device,
        MemoryRecorder::default(),
    )
    .expect("session");
    session
        .initialize(app(), "rotate", BTreeMap::new(), Rotation::Deg90)
        .expect("initialize");

    assert_eq!(session.step(), State::Error);
    let report = session.report().expect("report");
    assert_eq!(report.device_width, Some(1920));
    assert_eq!(report.device_height, Some(1080));
    let shot = session.memory().current_screenshot().expect("screenshot");
    let (width, height) = image::image_dimensions(shot).expect("dimensions");
    assert_eq!((width, height), (4, 2));
}

#[test]
fn private_facts_reach_the_decision_prompt() {
    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = ScriptedOracle::new().answer(Purpose::NextAction, TOUCH_ADD_NOTE);
    let mut session = Session::new(
        workspace.config(),
        oracle,
        ScriptedDetector::fixed(screen_elements()),
        FakeDevice::new(),
        MemoryRecorder::default(),
    )
    .expect("session");
    let facts = BTreeMap::from([("account".to_string(), "tester@example.com".to_string())]);
    session
        .initialize(app(), "log in", facts, Rotation::Deg0)
        .expect("initialize");
    session.step();

    let decision = session
        .chat()
        .pool()
        .get(Stage::ActionDecision)
        .expect("decision conversation");
    let system = decision.system.as_deref().expect("system prompt");
    assert!(system.contains("- account: tester@example.com"));
    assert!(system.contains("log in"));
}

/// Verifies the end check sees the screen left by the action it judges.
#[test]
fn end_check_sees_post_action_screen() {
    use std::path::PathBuf;

    let workspace = TestWorkspace::new().expect("workspace");
    let oracle = ScriptedOracle::new()
        .answer(Purpose::NextAction, TOUCH_ADD_NOTE)
        .answer(Purpose::LoadingCheck, NOT_LOADING)
        .answer(Purpose::ValidChange, EFFECT_OK)
        .answer(Purpose::EndCheck, DONE);
    let mut session = started(&workspace, oracle, FakeDevice::new());

    let outcome = run_to_completion(&mut session, 10, |_, _| {}).expect("run");
    assert_eq!(outcome.stop, LoopStop::End);

    let screens_for = |stage: Stage, label: &str| {
        session
            .chat()
            .pool()
            .get(stage)
            .expect("conversation")
            .messages
            .iter()
            .find(|message| message.text.contains(label))
            .map(|message| message.images.clone())
            .expect("screen turn")
    };
    let decided = vec![PathBuf::from("screen-1.png")];
    let captured = vec![PathBuf::from("screen-2.png")];
    assert_eq!(screens_for(Stage::EndingCheck, "previous GUI"), decided);
    assert_eq!(screens_for(Stage::EndingCheck, "current GUI"), captured);
    assert_eq!(screens_for(Stage::ValidChangeCheck, "current GUI"), captured);
}
