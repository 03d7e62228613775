//! # CLI - DocStore Interactive Shell
//!
//! A REPL-style command-line interface for the DocStore index.
//! Reads commands from stdin, executes them against the index, and prints
//! results to stdout. Designed for both interactive use and scripted testing
//! (pipe commands via stdin). Logs go to stderr.
//!
//! ## Commands
//!
//! ```text
//! SET key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! STATS              Print index debug info
//! SYNC               Flush the active segment again
//! EXIT / QUIT        Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! DOCSTORE_DATA_DIR  segment directory           (default: "data")
//! DOCSTORE_WAL_SYNC  fsync every WAL flush       (default: "true")
//! DOCSTORE_LOG       log filter if RUST_LOG unset (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! DocStore started (dir=data, segment=data/01760000000000000000.wal, keys=0)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::Config;
use engine::Index;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(&config);

    let mut index = Index::with_config(&config)
        .with_context(|| format!("failed to open {}", config.data_dir.display()))?;

    println!(
        "DocStore started (dir={}, segment={}, keys={})",
        index.dir().display(),
        index.active_segment().display(),
        index.len()
    );
    println!("Commands: SET key value | GET key | DEL key | STATS | SYNC | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        // Everything after the key, single-spaced, is the value.
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        match index.set(k.as_bytes(), v.as_bytes()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR set failed: {:#}", e),
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match index.get(k.as_bytes()) {
                            Some(v) => println!("{}", String::from_utf8_lossy(&v)),
                            None => println!("(nil)"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match index.remove(k.as_bytes()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {:#}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "STATS" => {
                    println!("{:?}", index);
                }
                "SYNC" => match index.sync() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR sync failed: {:#}", e),
                },
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    tracing::debug!(segment = %index.active_segment().display(), "shutting down");
    Ok(())
}
