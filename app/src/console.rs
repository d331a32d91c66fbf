// Operator console: a line-oriented command language read from stdin.
//
// Every command parses into a `Command`; `Console::execute` runs it against
// the registry and returns the text to print. Parsing and execution are kept
// apart so both can be tested without a terminal.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rigrelay::{Outcome, RadioFault, RadioId, RadioState, Registry, StationConfig};

use crate::open_lines;

pub const HELP: &str = "\
Commands:
  help                      Show this text
  status                    Short status for all radios
  status all                Detailed status for all radios
  status <radio>            Detailed status for one radio
  enable <radio>            Enable radio and power it up
  disable <radio>           Power radio down and disable it
  power                     Power status for all radios
  power <radio>             Power status for one radio
  power <radio> <on|off>    Switch radio power
  ptt                       PTT status for all radios
  ptt <radio>               PTT status for one radio
  ptt <radio> <on|off>      Key or unkey a radio
  id [radio]                Identify on one radio, or all enabled radios
  reload                    Re-read the configuration file
  quit                      Shut every radio down and exit
";

/// Which radios a `status` command covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTarget {
    Summary,
    All,
    One(RadioId),
}

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Status(StatusTarget),
    Enable(RadioId),
    Disable(RadioId),
    Power {
        radio: Option<RadioId>,
        on: Option<bool>,
    },
    Ptt {
        radio: Option<RadioId>,
        on: Option<bool>,
    },
    Id(Option<RadioId>),
    Reload,
    Quit,
}

/// A command line that could not be parsed. The message is meant for the
/// operator as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl std::fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseCommandError {}

fn usage(text: &str) -> ParseCommandError {
    ParseCommandError(format!("USAGE:\n   {text}"))
}

fn radio_arg(s: &str) -> Result<RadioId, ParseCommandError> {
    s.parse()
        .map_err(|_| ParseCommandError(format!("invalid radio {s} specified")))
}

fn switch_arg(s: &str) -> Result<bool, ParseCommandError> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Ok(true),
        "off" | "0" | "false" | "no" => Ok(false),
        _ => Err(ParseCommandError(format!("expected on or off, got {s}"))),
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, rest)) = args.split_first() else {
            return Err(ParseCommandError(HELP.trim_end().to_string()));
        };

        match (verb.to_ascii_lowercase().as_str(), rest) {
            ("help" | "?", _) => Ok(Command::Help),
            ("quit" | "exit", _) => Ok(Command::Quit),
            ("reload", _) => Ok(Command::Reload),

            ("status", []) => Ok(Command::Status(StatusTarget::Summary)),
            ("status", [all]) if all.eq_ignore_ascii_case("all") => {
                Ok(Command::Status(StatusTarget::All))
            }
            ("status", [radio]) => Ok(Command::Status(StatusTarget::One(radio_arg(radio)?))),
            ("status", _) => Err(usage("status [radio|all]")),

            ("enable", [radio]) => Ok(Command::Enable(radio_arg(radio)?)),
            ("enable", _) => Err(usage("enable <radio>\t- Enable radio channel <radio>")),
            ("disable", [radio]) => Ok(Command::Disable(radio_arg(radio)?)),
            ("disable", _) => Err(usage("disable <radio>\t- Disable radio channel <radio>")),

            ("power", []) => Ok(Command::Power {
                radio: None,
                on: None,
            }),
            ("power", [radio]) => Ok(Command::Power {
                radio: Some(radio_arg(radio)?),
                on: None,
            }),
            ("power", [radio, value]) => Ok(Command::Power {
                radio: Some(radio_arg(radio)?),
                on: Some(switch_arg(value)?),
            }),
            ("power", _) => Err(usage("power [radio [on|off]]")),

            ("ptt", []) => Ok(Command::Ptt {
                radio: None,
                on: None,
            }),
            ("ptt", [radio]) => Ok(Command::Ptt {
                radio: Some(radio_arg(radio)?),
                on: None,
            }),
            ("ptt", [radio, value]) => Ok(Command::Ptt {
                radio: Some(radio_arg(radio)?),
                on: Some(switch_arg(value)?),
            }),
            ("ptt", _) => Err(usage("ptt [radio [on|off]]")),

            ("id", []) => Ok(Command::Id(None)),
            ("id", [radio]) => Ok(Command::Id(Some(radio_arg(radio)?))),
            ("id", _) => Err(usage("id [radio]")),

            (other, _) => Err(ParseCommandError(format!(
                "unknown command '{other}', type 'help' for a list"
            ))),
        }
    }
}

/// Runs console commands against a registry.
pub struct Console {
    registry: Arc<Registry>,
    config_path: PathBuf,
    mock: bool,
}

impl Console {
    pub fn new(registry: Arc<Registry>, config_path: PathBuf, mock: bool) -> Self {
        Console {
            registry,
            config_path,
            mock,
        }
    }

    /// Execute one command and return what the operator should see.
    ///
    /// `Quit` is not handled here; the caller owns the shutdown sequence.
    pub async fn execute(&self, cmd: Command) -> Result<String> {
        let reg = &self.registry;
        let mut out = String::new();

        match cmd {
            Command::Help => out.push_str(HELP),
            Command::Quit => {}

            Command::Status(StatusTarget::One(id)) => match reg.snapshot(id).await {
                Ok(snap) => out.push_str(&snap.render(true)),
                Err(_) => invalid(&mut out, id),
            },
            Command::Status(target) => {
                let detailed = target == StatusTarget::All;
                let snaps = reg.snapshot_all().await;
                out.push_str("*** Status for ALL radios ***\n");
                for snap in &snaps {
                    out.push_str(&snap.render(detailed));
                }
                let _ = writeln!(
                    out,
                    "*** ({}/{} units active) ***",
                    reg.active_count().await,
                    snaps.len()
                );
            }

            Command::Enable(id) => {
                let outcome = reg.enable(id).await;
                report(&mut out, id, outcome);
            }
            Command::Disable(id) => {
                let outcome = reg.disable(id).await;
                report(&mut out, id, outcome);
            }

            Command::Power { radio: None, .. } => {
                out.push_str("POWER STATUS for ALL radios:\n");
                for snap in reg.snapshot_all().await {
                    let _ = writeln!(out, "{}: power {}", snap.id, on_off(snap.status.is_powered()));
                }
            }
            Command::Power {
                radio: Some(id),
                on: None,
            } => match reg.snapshot(id).await {
                Ok(snap) => {
                    let _ = writeln!(out, "{id}: power {}", on_off(snap.status.is_powered()));
                }
                Err(_) => invalid(&mut out, id),
            },
            Command::Power {
                radio: Some(id),
                on: Some(on),
            } => {
                let outcome = if on {
                    reg.power_on(id).await
                } else {
                    reg.power_off(id).await
                };
                match outcome {
                    Outcome::Disabled => {
                        let _ = writeln!(
                            out,
                            "Ignoring POWER {} for {id} because it is in DISABLED state",
                            on_off(on).to_uppercase()
                        );
                    }
                    Outcome::State(_) => {
                        let _ = writeln!(out, "POWER for {id} SET to {}", on_off(on).to_uppercase());
                    }
                    other => report(&mut out, id, other),
                }
            }

            Command::Ptt { radio: None, .. } => {
                out.push_str("PTT status for ALL radios:\n");
                let max = reg.max_radios().await;
                for index in 0..max {
                    let id = RadioId::from_index(index);
                    let _ = writeln!(out, "{id}: {}", ptt_word(reg.get_state(id).await, "off"));
                }
            }
            Command::Ptt {
                radio: Some(id),
                on: None,
            } => match reg.get_state(id).await {
                Outcome::Error(RadioFault::InvalidRadio) => invalid(&mut out, id),
                outcome => {
                    let _ = writeln!(out, "{id}: {}", ptt_word(outcome, "idle"));
                }
            },
            Command::Ptt {
                radio: Some(id),
                on: Some(on),
            } => {
                let outcome = if on {
                    reg.ptt_on(id).await
                } else {
                    reg.ptt_off(id).await
                };
                match outcome {
                    Outcome::Disabled => {
                        let _ = writeln!(
                            out,
                            "Denying PTT request for {id} because it is in DISABLED state."
                        );
                    }
                    Outcome::State(RadioState::Off) => {
                        let _ = writeln!(
                            out,
                            "Ignoring PTT request for {id} because it is powered off."
                        );
                    }
                    Outcome::Blocked => {
                        let penalty = match reg.snapshot(id).await {
                            Ok(snap) => rigrelay::format_duration(snap.penalty),
                            Err(_) => "?".to_string(),
                        };
                        let _ = writeln!(
                            out,
                            "{id}: Blocked due to TOT exceeded. Penalty remaining: {penalty}"
                        );
                    }
                    Outcome::State(_) => {
                        let _ = writeln!(out, "PTT for {id} SET to {}.", on_off(on).to_uppercase());
                    }
                    other => report(&mut out, id, other),
                }
            }

            Command::Id(Some(id)) => match reg.identify(id).await {
                Outcome::Disabled => {
                    let _ = writeln!(out, "Ignoring ID for {id} because it is in DISABLED state");
                }
                Outcome::State(_) => {
                    let _ = writeln!(out, "Sending ID on {id}");
                }
                other => report(&mut out, id, other),
            },
            Command::Id(None) => {
                let max = reg.max_radios().await;
                let mut sent = 0;
                for index in 0..max {
                    if let Outcome::State(_) = reg.identify(RadioId::from_index(index)).await {
                        sent += 1;
                    }
                }
                let _ = writeln!(out, "Sending ID on {sent} enabled radios");
            }

            Command::Reload => {
                let config = StationConfig::load(&self.config_path)
                    .await
                    .with_context(|| {
                        format!("failed to reload {}", self.config_path.display())
                    })?;
                let controller = open_lines(&config, self.mock).await?;
                reg.reload(config, controller).await;
                let _ = writeln!(out, "configuration reloaded from {}", self.config_path.display());
            }
        }

        Ok(out)
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn ptt_word(outcome: Outcome, otherwise: &'static str) -> &'static str {
    match outcome.state() {
        Some(state) if state.is_transmitting() => "transmitting",
        _ => otherwise,
    }
}

fn invalid(out: &mut String, id: RadioId) {
    let _ = writeln!(out, "invalid radio {} specified", id.index());
}

fn report(out: &mut String, id: RadioId, outcome: Outcome) {
    match outcome {
        Outcome::Error(RadioFault::InvalidRadio) => invalid(out, id),
        other => {
            let _ = writeln!(out, "{id}: {other}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigrelay::RegistryBuilder;
    use rigrelay_test_harness::MockLineController;

    const STATION: &str = "
[general]
max_radios = 2

[radio0]
enabled = yes
description = \"2m simplex\"
pin_power = 27
pin_ptt = 17

[radio1]
enabled = no
pin_ptt = 5
";

    async fn console() -> (Console, Arc<MockLineController>) {
        let mock = Arc::new(MockLineController::new());
        let config = StationConfig::parse(STATION).unwrap();
        let registry = RegistryBuilder::new(config)
            .controller(mock.clone())
            .build()
            .await
            .unwrap();
        let console = Console::new(
            Arc::new(registry),
            PathBuf::from("/nonexistent/rigrelay.conf"),
            true,
        );
        (console, mock)
    }

    async fn run(console: &Console, line: &str) -> String {
        console.execute(line.parse().unwrap()).await.unwrap()
    }

    #[test]
    fn parse_commands() {
        let r0 = RadioId::from_index(0);
        assert_eq!("help".parse::<Command>().unwrap(), Command::Help);
        assert_eq!("QUIT".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!(
            "status".parse::<Command>().unwrap(),
            Command::Status(StatusTarget::Summary)
        );
        assert_eq!(
            "status all".parse::<Command>().unwrap(),
            Command::Status(StatusTarget::All)
        );
        assert_eq!(
            "status radio0".parse::<Command>().unwrap(),
            Command::Status(StatusTarget::One(r0))
        );
        assert_eq!("enable 0".parse::<Command>().unwrap(), Command::Enable(r0));
        assert_eq!(
            "ptt 0 on".parse::<Command>().unwrap(),
            Command::Ptt {
                radio: Some(r0),
                on: Some(true)
            }
        );
        assert_eq!(
            "  power   0  off ".parse::<Command>().unwrap(),
            Command::Power {
                radio: Some(r0),
                on: Some(false)
            }
        );
        assert_eq!("id".parse::<Command>().unwrap(), Command::Id(None));
    }

    #[test]
    fn parse_errors() {
        assert!("enable".parse::<Command>().unwrap_err().to_string().starts_with("USAGE:"));
        assert_eq!(
            "disable x".parse::<Command>().unwrap_err().to_string(),
            "invalid radio x specified"
        );
        assert!("ptt 0 maybe".parse::<Command>().is_err());
        assert!("status 0 1".parse::<Command>().is_err());
        assert!("frobnicate".parse::<Command>().unwrap_err().to_string().contains("unknown command"));
        assert!("".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn status_summary_counts_active_radios() {
        let (console, _) = console().await;
        let text = run(&console, "status").await;
        assert!(text.starts_with("*** Status for ALL radios ***\n"));
        assert!(text.contains("* radio0: 2m simplex"));
        assert!(text.contains("*** (1/2 units active) ***"));
    }

    #[tokio::test]
    async fn ptt_on_and_off() {
        let (console, mock) = console().await;
        assert_eq!(run(&console, "ptt 0 on").await, "PTT for radio0 SET to ON.\n");
        assert!(mock.is_asserted(17));
        assert_eq!(run(&console, "ptt 0").await, "radio0: transmitting\n");
        assert_eq!(run(&console, "ptt 0 off").await, "PTT for radio0 SET to OFF.\n");
        assert!(!mock.is_asserted(17));
        assert_eq!(run(&console, "ptt 0").await, "radio0: idle\n");
    }

    #[tokio::test]
    async fn ptt_refused_when_disabled_or_off() {
        let (console, _) = console().await;
        assert!(run(&console, "ptt 1 on").await.starts_with("Denying PTT request for radio1"));

        run(&console, "power 0 off").await;
        assert!(run(&console, "ptt 0 on").await.contains("because it is powered off"));
    }

    #[tokio::test]
    async fn power_commands() {
        let (console, mock) = console().await;
        assert_eq!(
            run(&console, "power").await,
            "POWER STATUS for ALL radios:\nradio0: power on\nradio1: power off\n"
        );
        assert_eq!(run(&console, "power 0 off").await, "POWER for radio0 SET to OFF\n");
        assert!(!mock.is_asserted(27));
        assert!(run(&console, "power 1 on").await.starts_with("Ignoring POWER ON for radio1"));
    }

    #[tokio::test]
    async fn enable_disable_and_invalid_radio() {
        let (console, _) = console().await;
        assert_eq!(run(&console, "enable 1").await, "radio1: Idle\n");
        assert_eq!(run(&console, "disable 1").await, "radio1: OFF\n");
        assert_eq!(run(&console, "enable 7").await, "invalid radio 7 specified\n");
        assert_eq!(run(&console, "status 7").await, "invalid radio 7 specified\n");
    }

    #[tokio::test]
    async fn id_on_enabled_radios() {
        let (console, _) = console().await;
        assert_eq!(run(&console, "id").await, "Sending ID on 1 enabled radios\n");
        assert_eq!(run(&console, "id 0").await, "Sending ID on radio0\n");
        assert!(run(&console, "id 1").await.starts_with("Ignoring ID for radio1"));
    }

    #[tokio::test]
    async fn reload_failure_is_reported() {
        let (console, _) = console().await;
        let err = console.execute(Command::Reload).await.unwrap_err();
        assert!(err.to_string().contains("failed to reload"));
        // The running configuration is untouched.
        assert!(run(&console, "status 0").await.contains("2m simplex"));
    }
}
