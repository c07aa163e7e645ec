//! Scenario-driven GUI testing agent for Android apps.
//!
//! A [`session::Session`] walks a state machine that observes the screen, asks a
//! decision oracle for the next intent, resolves it to a widget on the detector's
//! output, executes it through a device bridge and verifies the effect, correcting
//! itself within fixed budgets. The code is split the same way throughout:
//!
//! - **[`core`]**: Pure logic (memory, conversations, coordinate mapping, answer
//!   extraction, text matching). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (config, prompts, oracle and detector
//!   processes, adb, recorder). Each sits behind a trait so tests can script it.
//! - **[`agents`]**: Oracle-backed roles (decider, resolver, supervisor, classifier)
//!   and the executor, each a set of functions over borrowed session state.
//!
//! [`session`] and [`looping`] coordinate these into the `gui-agent run` command.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod scenario;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
