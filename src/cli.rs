//! CLI argument parsing and command handling.
//!
//! Hook mode is the default (no subcommand, JSON on stdin). The subcommands
//! exist for humans: `test` evaluates a command and explains the verdict,
//! `rules` lists the effective rule set, `offload` runs the output
//! offloader over stdin.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;

use crate::config::Config;
use crate::guard::Guard;
use crate::offload::{OffloadConfig, OffloadResult, offload_output};

/// Rule-based command gate for AI coding agents.
///
/// cmdgate protects against accidental execution of destructive commands by
/// AI coding agents: recursive deletes, history-destroying git operations,
/// network fetches piped into shells, and anything else the rule set names.
#[derive(Parser, Debug)]
#[command(name = "cmdgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run (omit to run in hook mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a command and print the verdict
    #[command(name = "test")]
    Test {
        /// The command text to evaluate (joined with spaces)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Emit the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the effective rule set
    #[command(name = "rules")]
    Rules {
        /// Emit the rule set as JSON
        #[arg(long)]
        json: bool,
    },

    /// Offload oversized output read from stdin
    #[command(name = "offload")]
    Offload {
        /// Exit code of the command that produced the output
        #[arg(long, default_value_t = 0)]
        exit_code: i32,

        /// Override the configured token threshold
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

/// Run the `test` subcommand. Returns the process exit code: 0 when the
/// command is allowed, 2 when blocked.
#[must_use]
pub fn run_test(config: &Config, command_words: &[String], json: bool) -> i32 {
    let command_text = command_words.join(" ");
    let guard = Guard::new(config.rule_set())
        .with_fast_path(config.fast_path_prefixes())
        .with_verbose(config.general.verbose);
    let result = guard.evaluate(&command_text);

    if json {
        let value = serde_json::json!({
            "command": command_text,
            "blocked": result.blocked,
            "rule": result.rule_name(),
            "reason": result.reason(),
        });
        println!("{value}");
    } else if result.blocked {
        println!(
            "{} {} ({})",
            "BLOCKED".red().bold(),
            result.rule_name().unwrap_or("unknown"),
            result.reason().unwrap_or("no reason"),
        );
    } else {
        println!("{} {command_text}", "ALLOWED".green().bold());
    }

    i32::from(result.blocked) * 2
}

/// Run the `rules` subcommand.
#[must_use]
pub fn run_rules(config: &Config, json: bool) -> i32 {
    let set = config.rule_set();

    if json {
        match serde_json::to_string_pretty(&set) {
            Ok(out) => println!("{out}"),
            Err(err) => {
                eprintln!("cmdgate: cannot serialize rules: {err}");
                return 1;
            }
        }
        return 0;
    }

    println!("{} ({})", "Block rules".red().bold(), set.block.len());
    for rule in &set.block {
        let kind = if rule.is_pipeline_rule() { " [pipeline]" } else { "" };
        println!("  {}{kind}  {}", rule.name.yellow(), rule.reason.bright_black());
    }
    println!("{} ({})", "Allow rules".green().bold(), set.allow.len());
    for rule in &set.allow {
        println!("  {}  {}", rule.name.yellow(), rule.reason.bright_black());
    }
    0
}

/// Run the `offload` subcommand: read stdin, apply the policy, print either
/// the original text or the pointer message.
#[must_use]
pub fn run_offload(config: &Config, exit_code: i32, max_tokens: Option<usize>) -> i32 {
    let mut text = String::new();
    if let Err(err) = std::io::stdin().lock().read_to_string(&mut text) {
        eprintln!("cmdgate: cannot read stdin: {err}");
        return 1;
    }

    let offload_config = OffloadConfig {
        max_tokens: max_tokens.unwrap_or(config.offload.max_tokens),
        ..config.offload.clone()
    };

    match offload_output(&text, exit_code, &offload_config) {
        Ok(OffloadResult::Unchanged) => {
            print!("{text}");
            0
        }
        Ok(OffloadResult::Offloaded { message, .. }) => {
            println!("{message}");
            0
        }
        Err(err) => {
            // Fail open: pass the text through rather than lose it.
            eprintln!("cmdgate: offload failed: {err}");
            print!("{text}");
            0
        }
    }
}
