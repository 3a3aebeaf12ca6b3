//! Command parsing for the interactive `kv` shell.
//!
//! Turns a line like `PUT foo bar` into a [`ConsoleCommand`]. Only `GET`, `PUT`
//! and `APPEND` reach the cluster; the rest are local to the shell.

use anyhow::{Result, anyhow};

/// Commands that can be entered at the shell prompt.
#[derive(Debug, PartialEq)]
pub enum ConsoleCommand {
    Get { key: String },
    Put { key: String, value: String },
    Append { key: String, value: String },
    Status,
    Help,
    Exit,
}

impl ConsoleCommand {
    /// Parses a line of user input into a command.
    ///
    /// Commands are case-insensitive and support aliases:
    /// - `GET <key>` (alias: `g`)
    /// - `PUT <key> <value>` (alias: `p`)
    /// - `APPEND <key> <value>` (alias: `a`)
    /// - `STATUS` (alias: `s`) - client id, leader hint and roster
    /// - `HELP` (alias: `h`)
    /// - `EXIT` (alias: `e`, `quit`)
    ///
    /// The value of a write is the rest of the line, so it may contain spaces.
    /// With `allow_writes = false`, `PUT` and `APPEND` are rejected.
    pub fn parse(line: &str, allow_writes: bool) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("empty command"));
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim_start()),
            None => (trimmed, ""),
        };

        let cmd = head.to_uppercase();
        let normalized_cmd = match cmd.as_str() {
            "G" => "GET",
            "P" => "PUT",
            "A" => "APPEND",
            "S" => "STATUS",
            "H" => "HELP",
            "E" | "QUIT" => "EXIT",
            other => other,
        };

        match normalized_cmd {
            "EXIT" => return Ok(ConsoleCommand::Exit),
            "HELP" => return Ok(ConsoleCommand::Help),
            "STATUS" => return Ok(ConsoleCommand::Status),
            _ => {}
        }

        match normalized_cmd {
            "GET" => match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
                [key] => Ok(ConsoleCommand::Get {
                    key: key.to_string(),
                }),
                _ => Err(anyhow!("GET requires exactly one argument: GET <key>")),
            },
            "PUT" | "APPEND" if !allow_writes => {
                Err(anyhow!("{normalized_cmd} not allowed in read-only mode"))
            }
            "PUT" | "APPEND" => {
                let Some((key, value)) = rest.split_once(char::is_whitespace) else {
                    return Err(anyhow!(
                        "{normalized_cmd} requires two arguments: {normalized_cmd} <key> <value>"
                    ));
                };
                let (key, value) = (key.to_string(), value.trim_start().to_string());
                if normalized_cmd == "PUT" {
                    Ok(ConsoleCommand::Put { key, value })
                } else {
                    Ok(ConsoleCommand::Append { key, value })
                }
            }
            _ => Err(anyhow!(
                "invalid command. Try: GET/g <key>, PUT/p <key> <value>, APPEND/a <key> <value>, STATUS/s, HELP/h, EXIT/e"
            )),
        }
    }

    /// Lines printed by `HELP`.
    pub fn help_lines() -> &'static [&'static str] {
        &[
            "Commands (case-insensitive):",
            "  GET <key>             (alias: g)  -- read a key",
            "  PUT <key> <value>     (alias: p)  -- replace a key",
            "  APPEND <key> <value>  (alias: a)  -- append to a key",
            "  STATUS                (alias: s)  -- show client id and leader hint",
            "  HELP                  (alias: h)  -- show this message",
            "  EXIT                  (alias: e)  -- leave the shell",
        ]
    }
}
