//! Stable exit codes for gui-agent CLI commands.

/// The session reached `END`, or a non-run command succeeded.
pub const OK: i32 = 0;
/// Invalid config or scenario, or any error outside a session.
pub const INVALID: i32 = 1;
/// The session gave up after exhausting its correction budgets.
pub const FAILED: i32 = 2;
/// The session stopped on a protocol or collaborator failure.
pub const ERROR: i32 = 3;
/// `--max-ticks` ran out before a terminal state.
pub const TICK_LIMIT: i32 = 4;
