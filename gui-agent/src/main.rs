//! Scenario-driven GUI testing agent.
//!
//! `gui-agent run` launches the app named by a scenario file on an adb device and
//! drives it until the scenario is judged complete, the agent gives up, or an error
//! stops the session. Artifacts land in the recorder directories from the config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use gui_agent::exit_codes;
use gui_agent::io::config::{AgentConfig, load_config, write_config};
use gui_agent::io::detector::CommandDetector;
use gui_agent::io::device::AdbBridge;
use gui_agent::io::oracle::CommandOracle;
use gui_agent::io::recorder::FileRecorder;
use gui_agent::logging;
use gui_agent::looping::{LoopStop, run_to_completion};
use gui_agent::scenario::load_scenario;
use gui_agent::session::Session;

const DEFAULT_CONFIG: &str = "gui-agent.toml";
const DEFAULT_MAX_TICKS: u32 = 200;

#[derive(Parser)]
#[command(
    name = "gui-agent",
    version,
    about = "Scenario-driven GUI testing agent for Android apps"
)]
struct Cli {
    /// Agent config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config file.
    CheckConfig,
    /// Run one scenario to a terminal state.
    Run {
        /// Scenario file (TOML).
        #[arg(long)]
        scenario: PathBuf,
        /// Device serial, overriding `device.serial`.
        #[arg(long)]
        serial: Option<String>,
        /// Stop after this many ticks.
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        max_ticks: u32,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::CheckConfig => cmd_check_config(&cli.config),
        Command::Run {
            scenario,
            serial,
            max_ticks,
        } => cmd_run(&cli.config, &scenario, serial, max_ticks),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &AgentConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_check_config(path: &Path) -> Result<i32> {
    let config = load_config(path)?;
    config.oracle.require_command("oracle")?;
    config.detector.require_command("detector")?;
    println!("{} is valid", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    config_path: &Path,
    scenario_path: &Path,
    serial: Option<String>,
    max_ticks: u32,
) -> Result<i32> {
    let mut config = load_config(config_path)?;
    if serial.is_some() {
        config.device.serial = serial;
    }
    let file = load_scenario(scenario_path)?;

    let oracle = CommandOracle::from_config(&config.oracle)?;
    let detector = CommandDetector::from_config(&config.detector)?;
    let device = AdbBridge::new(config.device.clone());
    let recorder = FileRecorder::new(&config.recorder, &file.scenario.name, &file.app.name);
    let mut session = Session::new(config, oracle, detector, device, recorder)?;

    if let Err(err) = session.initialize(
        file.app.clone(),
        file.scenario.description.clone(),
        file.scenario.facts.clone(),
        file.scenario.rotation,
    ) {
        eprintln!("{:#}", err);
        return Ok(exit_codes::ERROR);
    }

    let outcome = run_to_completion(&mut session, max_ticks, |tick, state| {
        println!("tick {tick}: {state}");
    })?;
    if let Some(paths) = session.recorder().written() {
        println!("script: {}", paths.script.display());
        println!("chat: {}", paths.chat.display());
    }
    println!(
        "{} after {} ticks, {} actions",
        session.state(),
        outcome.ticks,
        outcome.actions
    );

    Ok(match outcome.stop {
        LoopStop::End => exit_codes::OK,
        LoopStop::Failed => exit_codes::FAILED,
        LoopStop::Error { reason } => {
            if let Some(reason) = reason {
                eprintln!("{reason}");
            }
            exit_codes::ERROR
        }
        LoopStop::TickLimit { .. } => exit_codes::TICK_LIMIT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::try_parse_from(["gui-agent", "init", "--force"]).expect("parse");
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "gui-agent",
            "run",
            "--scenario",
            "scenarios/create-note.toml",
            "--config",
            "custom.toml",
            "--serial",
            "emulator-5554",
            "--max-ticks",
            "12",
        ])
        .expect("parse");
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        match cli.command {
            Command::Run {
                scenario,
                serial,
                max_ticks,
            } => {
                assert_eq!(scenario, PathBuf::from("scenarios/create-note.toml"));
                assert_eq!(serial.as_deref(), Some("emulator-5554"));
                assert_eq!(max_ticks, 12);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_scenario() {
        assert!(Cli::try_parse_from(["gui-agent", "run"]).is_err());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gui-agent.toml");
        assert_eq!(cmd_init(&path, false).expect("init"), exit_codes::OK);
        assert!(cmd_init(&path, false).is_err());
        assert_eq!(cmd_init(&path, true).expect("init --force"), exit_codes::OK);
    }
}
