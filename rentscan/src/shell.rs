// rentscan/src/shell.rs
//! Operator commands for the central.
//!
//! ```text
//! scan start | scan stop
//! disconnect
//! reset
//! status
//! whitelist add <addr> [random|public]
//! whitelist clear
//! handles
//! subscribe <tx-value-handle> <ccc-handle>
//! reset_errors
//! ```

use std::str::FromStr;

use crate::central::{Central, Enabled};
use crate::recovery::{Failure, RecoveryLevel};
use crate::types::{Address, Handle};
use crate::{Error, Result};

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ScanStart,
    ScanStop,
    Disconnect,
    /// Full stack reset.
    Reset,
    Status,
    WhitelistAdd(Address),
    WhitelistClear,
    Handles,
    Subscribe { tx: Handle, ccc: Handle },
    ResetErrors,
}

/// Accepts `0x0015` or `21`.
fn parse_handle(s: &str) -> Result<Handle> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    match parsed {
        Ok(0) | Err(_) => Err(Error::InvalidCommand(format!("bad handle '{}'", s))),
        Ok(v) => Ok(Handle::new(v)),
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let cmd = match words.as_slice() {
            ["scan", "start"] => Command::ScanStart,
            ["scan", "stop"] => Command::ScanStop,
            ["disconnect"] => Command::Disconnect,
            ["reset"] => Command::Reset,
            ["status"] => Command::Status,
            ["whitelist", "add", rest @ ..] if !rest.is_empty() => {
                Command::WhitelistAdd(rest.join(" ").parse()?)
            }
            ["whitelist", "clear"] => Command::WhitelistClear,
            ["handles"] => Command::Handles,
            ["subscribe", tx, ccc] => Command::Subscribe {
                tx: parse_handle(tx)?,
                ccc: parse_handle(ccc)?,
            },
            ["reset_errors"] => Command::ResetErrors,
            _ => return Err(Error::InvalidCommand(line.trim().to_string())),
        };
        Ok(cmd)
    }
}

/// Run one command and return the text to show the operator.
pub fn execute(central: &mut Central<Enabled>, cmd: &Command) -> Result<String> {
    match cmd {
        Command::ScanStart => {
            central.start_scan()?;
            Ok("scanning".to_string())
        }
        Command::ScanStop => {
            central.stop_scan();
            Ok("scan stopped".to_string())
        }
        Command::Disconnect => {
            central.disconnect()?;
            Ok("disconnected".to_string())
        }
        Command::Reset => {
            let level = central.recover(Failure::Manual(RecoveryLevel::FullStackReset))?;
            Ok(format!("{} done", level))
        }
        Command::Status => Ok(central.status().to_string()),
        Command::WhitelistAdd(addr) => {
            central.allow_list_add(addr)?;
            Ok(format!("{} added to whitelist", addr))
        }
        Command::WhitelistClear => {
            central.allow_list_clear()?;
            Ok("whitelist cleared".to_string())
        }
        Command::Handles => Ok(central.handles().to_string()),
        Command::Subscribe { tx, ccc } => {
            let stage = central.subscribe_manual(*tx, *ccc)?;
            Ok(format!("subscribe {} via {}: {:?}", tx, ccc, stage))
        }
        Command::ResetErrors => {
            central.reset_errors();
            Ok("error counters reset".to_string())
        }
    }
}

/// Parse and execute one line.
pub fn run_line(central: &mut Central<Enabled>, line: &str) -> Result<String> {
    let cmd: Command = line.parse()?;
    execute(central, &cmd)
}
