#![forbid(unsafe_code)]
//! cmdgate binary: rule-based command gate for AI coding agents.
//!
//! Runs as a `PreToolUse` hook by default. Exit behavior:
//!   - Exit 0 with JSON {"hookSpecificOutput": {"permissionDecision": "deny", ...}} = block
//!   - Exit 0 with no output = allow
//!
//! The gate never breaks the host session: unparseable hook input, parse
//! failures, and even panics inside evaluation resolve to allow, with a
//! diagnostic on stderr.

use clap::Parser;
use cmdgate::cli::{self, Cli};
use cmdgate::config::Config;
use cmdgate::guard::{CheckResult, Guard};
use cmdgate::hook;
use cmdgate::logging::DecisionLog;
use std::panic::{self, AssertUnwindSafe};

/// Upper bound on hook input size; the daemon side must not let an agent
/// feed us unbounded JSON.
const MAX_HOOK_INPUT_BYTES: usize = 1024 * 1024;

fn main() {
    hook::configure_colors();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap handles --help/--version through this path too.
            err.exit();
        }
    };

    let config = Config::load();

    let exit_code = match cli.command {
        Some(cli::Command::Test { command, json }) => cli::run_test(&config, &command, json),
        Some(cli::Command::Rules { json }) => cli::run_rules(&config, json),
        Some(cli::Command::Offload {
            exit_code,
            max_tokens,
        }) => cli::run_offload(&config, exit_code, max_tokens),
        None => run_hook_mode(&config),
    };

    std::process::exit(exit_code);
}

/// Hook mode: read one request from stdin, evaluate, emit a denial if a
/// block rule fired. Always exits 0; a hook that errors must not take the
/// session down with it.
fn run_hook_mode(config: &Config) -> i32 {
    let input = match hook::read_hook_input(MAX_HOOK_INPUT_BYTES) {
        Ok(input) => input,
        Err(err) => {
            if config.general.verbose {
                eprintln!("cmdgate: unreadable hook input, allowing: {err:?}");
            }
            return 0;
        }
    };

    let Some(command) = hook::extract_hook_command(&input) else {
        // Not a Bash invocation; nothing to gate.
        return 0;
    };

    // Kill switch, checked after stdin is drained so the writer never sees
    // a broken pipe.
    if Config::is_bypassed() {
        return 0;
    }

    let guard = Guard::new(config.rule_set())
        .with_fast_path(config.fast_path_prefixes())
        .with_verbose(config.general.verbose);

    // Fail open on any internal error: a panic in evaluation must map to
    // allow, never to a crashed hook.
    let result = panic::catch_unwind(AssertUnwindSafe(|| guard.evaluate(&command)))
        .unwrap_or_else(|_| {
            eprintln!("cmdgate: internal error during evaluation, allowing");
            CheckResult::allowed()
        });

    if let Some(log) = DecisionLog::new(config.general.log_file.as_deref(), config.general.log_format)
    {
        if let Err(err) = log.append(&command, &result) {
            if config.general.verbose {
                eprintln!("cmdgate: decision log write failed: {err}");
            }
        }
    }

    if result.blocked {
        hook::output_denial(
            &command,
            result.rule_name().unwrap_or("unknown"),
            result.reason().unwrap_or("blocked by rule"),
        );
    }

    0
}
