//! Decision oracle abstraction.
//!
//! The [`Oracle`] trait decouples the session from the vision-language backend.
//! [`CommandOracle`] pipes each request as JSON to a configured command; tests use
//! scripted oracles keyed by [`Purpose`].

use std::fmt;
use std::process::Command;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::core::conversation::{Conversation, Message, Stage};
use crate::io::config::CommandConfig;
use crate::io::process::run_command_with_timeout;

/// What a question is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    NextAction,
    ReviseAction,
    MatchWidget,
    AnalyzeMissing,
    PredictLocation,
    InputPosition,
    RematchWidget,
    FixLocation,
    AnalyzeSituation,
    LoadingCheck,
    ValidChange,
    PageChange,
    EndCheck,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::NextAction => "next-action",
            Purpose::ReviseAction => "revise-action",
            Purpose::MatchWidget => "match-widget",
            Purpose::AnalyzeMissing => "analyze-missing",
            Purpose::PredictLocation => "predict-location",
            Purpose::InputPosition => "input-position",
            Purpose::RematchWidget => "rematch-widget",
            Purpose::FixLocation => "fix-location",
            Purpose::AnalyzeSituation => "analyze-situation",
            Purpose::LoadingCheck => "loading-check",
            Purpose::ValidChange => "valid-change",
            Purpose::PageChange => "page-change",
            Purpose::EndCheck => "end-check",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question. The conversation already ends with the new user turn.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub stage: Stage,
    pub purpose: Purpose,
    pub conversation: &'a Conversation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReply {
    pub text: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
}

/// Abstraction over decision backends.
pub trait Oracle {
    fn ask(&self, request: &OracleRequest<'_>) -> Result<OracleReply>;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    stage: Stage,
    purpose: Purpose,
    system: Option<&'a str>,
    messages: &'a [Message],
}

/// Oracle backed by an external command speaking JSON over stdin/stdout.
///
/// Stdout is parsed as an [`OracleReply`]; anything else is taken as raw answer
/// text with zero token usage.
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    config: CommandConfig,
}

impl CommandOracle {
    pub fn from_config(config: &CommandConfig) -> Result<Self> {
        let (program, args) = config.require_command("oracle")?;
        Ok(Self {
            program: program.to_string(),
            args: args.to_vec(),
            config: config.clone(),
        })
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(stage = %request.stage, purpose = %request.purpose))]
    fn ask(&self, request: &OracleRequest<'_>) -> Result<OracleReply> {
        let payload = serde_json::to_vec(&WireRequest {
            stage: request.stage,
            purpose: request.purpose,
            system: request.conversation.system.as_deref(),
            messages: &request.conversation.messages,
        })
        .context("serialize oracle request")?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        info!(program = %self.program, bytes = payload.len(), "asking oracle");
        let output = run_command_with_timeout(
            cmd,
            Some(&payload),
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .context("run oracle command")?;
        output.ensure_success("oracle command")?;

        let stdout = output.stdout_text();
        let reply = match serde_json::from_str::<OracleReply>(stdout.trim()) {
            Ok(reply) => reply,
            Err(_) => {
                debug!("oracle stdout is not a reply object, using raw text");
                OracleReply {
                    text: stdout.trim().to_string(),
                    ..OracleReply::default()
                }
            }
        };
        Ok(reply)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn script(dir: &std::path::Path, body: &str) -> CommandConfig {
        let path = dir.join("oracle.sh");
        fs::write(&path, format!("#!/bin/sh\ncat > /dev/null\n{body}\n")).expect("write script");
        CommandConfig {
            command: vec!["sh".to_string(), path.display().to_string()],
            ..CommandConfig::default()
        }
    }

    fn conversation() -> Conversation {
        let mut conversation = Conversation::default();
        conversation.set_system("system");
        conversation.push_user("is it loading?", vec![PathBuf::from("screen.png")]);
        conversation
    }

    #[test]
    fn reads_structured_reply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = script(
            temp.path(),
            r#"echo '{"text": "answer: F", "tokens_in": 12, "tokens_out": 3}'"#,
        );
        let oracle = CommandOracle::from_config(&config).expect("oracle");
        let conversation = conversation();
        let reply = oracle
            .ask(&OracleRequest {
                stage: Stage::LoadingCheck,
                purpose: Purpose::LoadingCheck,
                conversation: &conversation,
            })
            .expect("ask");
        assert_eq!(reply.text, "answer: F");
        assert_eq!(reply.tokens_in, 12);
    }

    #[test]
    fn falls_back_to_raw_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = script(temp.path(), "echo 'answer: T'");
        let oracle = CommandOracle::from_config(&config).expect("oracle");
        let conversation = conversation();
        let reply = oracle
            .ask(&OracleRequest {
                stage: Stage::LoadingCheck,
                purpose: Purpose::LoadingCheck,
                conversation: &conversation,
            })
            .expect("ask");
        assert_eq!(reply.text, "answer: T");
        assert_eq!(reply.tokens_out, 0);
    }

    #[test]
    fn failing_command_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = script(temp.path(), "exit 4");
        let oracle = CommandOracle::from_config(&config).expect("oracle");
        let conversation = conversation();
        let err = oracle
            .ask(&OracleRequest {
                stage: Stage::EndingCheck,
                purpose: Purpose::EndCheck,
                conversation: &conversation,
            })
            .unwrap_err();
        assert!(format!("{err:#}").contains("oracle command failed"));
    }
}
