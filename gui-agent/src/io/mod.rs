//! Side-effecting adapters: processes, device, files, prompts.

pub mod config;
pub mod detector;
pub mod device;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod recorder;
pub mod screen;
