//! Command-line client for the replicated key-value store.
//!
//! # Example usage
//!
//! ```bash
//! # Interactive shell against the servers listed in config/client.toml
//! cargo run --bin kv -- --config config/client.toml
//!
//! # One-shot commands with an explicit roster
//! cargo run --bin kv -- --server 127.0.0.1:7001,127.0.0.1:7002,127.0.0.1:7003 put foo bar
//! cargo run --bin kv -- --server 127.0.0.1:7001,127.0.0.1:7002,127.0.0.1:7003 get foo
//! ```
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `warn`).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};

use raft_kv_client::KvClient;
use raft_kv_client::config::{ClientConfig, ServerAddr};
use raft_kv_client::protocol::ConsoleCommand;

/// Command-line arguments for the client.
#[derive(Parser, Debug)]
#[command(author, version, about = "Talk to a Raft-replicated key-value store")]
struct Args {
    /// Path to the client configuration file
    #[arg(long, short, value_hint = ValueHint::FilePath, default_value = "config/client.toml")]
    config: PathBuf,

    /// Comma-separated roster overriding the config file: host:port,host:port,...
    #[arg(long, value_delimiter = ',', value_hint = ValueHint::Other)]
    server: Vec<ServerAddr>,

    /// Reject PUT and APPEND
    #[arg(long)]
    read_only: bool,

    /// Run a single command (e.g. `get foo`) and exit instead of starting the shell
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = if args.server.is_empty() {
        ClientConfig::from_file(&args.config)?
    } else {
        ClientConfig::with_servers(args.server.clone())
    };
    let client = KvClient::connect(&config).context("failed to create client")?;

    if !args.command.is_empty() {
        let line = args.command.join(" ");
        let command = ConsoleCommand::parse(&line, !args.read_only)?;
        let mut stdout = io::stdout().lock();
        execute(&client, command, &mut stdout)?;
        return Ok(());
    }

    run_shell(&client, args.read_only)
}

/// Reads commands from stdin until EOF or `EXIT`.
fn run_shell(client: &KvClient, read_only: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "Connected as client {} to {} servers. Type HELP (or h) for commands.",
        client.client_id(),
        client.roster().len()
    )?;

    let mut line = String::new();
    loop {
        write!(stdout, "kv> ")?;
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            writeln!(stdout)?;
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match ConsoleCommand::parse(&line, !read_only) {
            Ok(ConsoleCommand::Exit) => break,
            Ok(command) => {
                if let Err(err) = execute(client, command, &mut stdout) {
                    writeln!(stdout, "ERROR: {err:#}")?;
                }
            }
            Err(err) => writeln!(stdout, "ERROR: {err}")?,
        }
    }

    Ok(())
}

/// Executes one command, printing its result.
fn execute<W: Write>(client: &KvClient, command: ConsoleCommand, out: &mut W) -> Result<()> {
    match command {
        ConsoleCommand::Get { key } => match client.get(&key)? {
            Some(value) => writeln!(out, "{key} = {value}")?,
            None => writeln!(out, "{key} not found")?,
        },
        ConsoleCommand::Put { key, value } => {
            client.put(&key, &value)?;
            writeln!(out, "OK")?;
        }
        ConsoleCommand::Append { key, value } => {
            client.append(&key, &value)?;
            writeln!(out, "OK")?;
        }
        ConsoleCommand::Status => {
            writeln!(
                out,
                "Client {} | Leader hint: {} ({})",
                client.client_id(),
                client.leader_hint(),
                client.roster().get(client.leader_hint())
            )?;
            for (index, endpoint) in client.roster().iter().enumerate() {
                writeln!(out, "  [{index}] {endpoint}")?;
            }
        }
        ConsoleCommand::Help => {
            for line in ConsoleCommand::help_lines() {
                writeln!(out, "{line}")?;
            }
        }
        ConsoleCommand::Exit => {}
    }
    Ok(())
}
