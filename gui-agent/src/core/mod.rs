//! Deterministic, pure logic shared by the session engine.
//!
//! Core modules must be free of device and process I/O. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod answers;
pub mod budget;
pub mod conversation;
pub mod coords;
pub mod extract;
pub mod memory;
pub mod text_match;
pub mod types;
