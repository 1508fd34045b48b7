use crate::config::ActionOverride;
use crate::error::ProtocolError;
use anyhow::{Result, bail};
use std::fmt;

pub const SHUTDOWN_CODE: u8 = 7;
pub const MIN_CODE: u8 = 1;
pub const MAX_CODE: u8 = 7;

const LABELS: [&str; 7] = [
    "Date and time",
    "Uptime",
    "Memory use",
    "Netstat",
    "Current users",
    "Running process",
    "Quit",
];

const DEFAULT_COMMANDS: [&str; 6] = ["date", "uptime", "free", "netstat", "w", "ps -e"];

/// An external program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Splits a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn builtin(line: &'static str) -> Self {
        Self::parse(line).unwrap_or_else(|| Self {
            program: line.to_string(),
            args: Vec::new(),
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Command(CommandSpec),
    Shutdown,
}

/// Maps action codes 1-6 to commands and 7 to shutdown.
#[derive(Debug, Clone)]
pub struct Catalog {
    commands: [CommandSpec; 6],
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            commands: DEFAULT_COMMANDS.map(CommandSpec::builtin),
        }
    }
}

impl Catalog {
    pub fn with_overrides(overrides: &[ActionOverride]) -> Result<Self> {
        let mut catalog = Self::default();
        for o in overrides {
            if o.code < MIN_CODE || o.code >= SHUTDOWN_CODE {
                bail!("action {} cannot be overridden, only 1-6 map to commands", o.code);
            }
            let Some(spec) = CommandSpec::parse(&o.command) else {
                bail!("action {} has an empty command", o.code);
            };
            catalog.commands[usize::from(o.code - 1)] = spec;
        }
        Ok(catalog)
    }

    pub fn resolve(&self, code: u8) -> Result<Action, ProtocolError> {
        match code {
            SHUTDOWN_CODE => Ok(Action::Shutdown),
            MIN_CODE..SHUTDOWN_CODE => Ok(Action::Command(
                self.commands[usize::from(code - 1)].clone(),
            )),
            _ => Err(ProtocolError::InvalidAction(code)),
        }
    }

    pub fn menu() -> String {
        let mut menu = String::from("\n\nMenu of Actions\n---------------\n");
        for (i, label) in LABELS.iter().enumerate() {
            menu.push_str(&format!("{}. {}\n", i + 1, label));
        }
        menu
    }
}

/// Parses a request payload into an action code without range checking.
pub fn parse_action_code(payload: &str) -> Result<u8, ProtocolError> {
    payload
        .trim()
        .parse::<u8>()
        .map_err(|_| ProtocolError::NotANumber(payload.to_string()))
}
