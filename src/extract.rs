//! Command extraction: flattening a shell tree into structured records.
//!
//! The extractor walks a [`ShellNode`] tree depth-first, left to right, and
//! produces one [`StructuredCommand`] per leaf command. Containers recurse,
//! unknown constructs contribute nothing, and malformed fragments are
//! skipped rather than surfaced as errors. The guard must never crash on
//! syntax it does not understand.

use crate::shell::ShellNode;

/// Multi-verb tools whose first positional argument is a subcommand.
///
/// git is the reference case; the rest match the built-in rule coverage.
const MULTI_VERB_COMMANDS: &[&str] = &["git", "docker", "kubectl", "cargo", "npm"];

/// One parsed command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredCommand {
    /// Executable name (e.g. `rm`, `git`).
    pub command: String,
    /// Non-flag tokens, in order.
    pub positional_args: Vec<String>,
    /// Flag names: one entry per short-cluster character (`-rf` → `r`, `f`)
    /// or per long flag with `--` and any `=value` suffix stripped
    /// (`--force`, `--depth=1` → `force`, `depth`). Deduplicated.
    pub flags: Vec<String>,
    /// Positional args that look like filesystem paths: text starting with
    /// `/`, `~`, `$`, or `.`.
    pub path_like_args: Vec<String>,
    /// Every suffix token in original form, for pattern matching against the
    /// reconstructed argument string.
    pub raw_tokens: Vec<String>,
    /// First positional argument, for multi-verb tools only.
    pub subcommand: Option<String>,
    /// Remaining positional arguments after the subcommand.
    pub subcommand_args: Vec<String>,
}

impl StructuredCommand {
    /// Check flag membership.
    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Space-joined raw tokens, the text arg patterns are tested against.
    #[must_use]
    pub fn joined_args(&self) -> String {
        self.raw_tokens.join(" ")
    }
}

/// Flatten a shell tree into a left-to-right sequence of structured commands.
///
/// Empty trees yield an empty sequence. Unknown node kinds and nameless
/// command nodes contribute nothing; extraction never fails.
#[must_use]
pub fn extract_commands(node: &ShellNode) -> Vec<StructuredCommand> {
    let mut out = Vec::new();
    collect(node, &mut out);
    out
}

fn collect(node: &ShellNode, out: &mut Vec<StructuredCommand>) {
    match node {
        ShellNode::Sequence(children) | ShellNode::Pipeline(children) => {
            for child in children {
                collect(child, out);
            }
        }
        ShellNode::Logical { left, right } => {
            collect(left, out);
            collect(right, out);
        }
        ShellNode::Command { name, suffix } => {
            if let Some(name) = name {
                out.push(parse_command(name, suffix));
            }
        }
        ShellNode::Grouping(inner) => collect(inner, out),
        ShellNode::Unknown => {}
    }
}

/// Parse one leaf command from its name and suffix tokens.
///
/// Token classification:
/// - `--long` / `--long=value`: long flag, `=value` stripped;
/// - `-abc`: short-flag cluster, one flag per character, unless the token is
///   a bare signed number (`-10` is a positional argument, not flags `1`,`0`);
/// - a bare `--` terminator is recorded in `raw_tokens` only;
/// - everything else: positional, additionally path-like when it starts with
///   `/`, `~`, `$`, or `.`.
#[must_use]
pub fn parse_command(name: &str, suffix: &[String]) -> StructuredCommand {
    let mut cmd = StructuredCommand {
        command: name.to_string(),
        ..StructuredCommand::default()
    };

    for token in suffix {
        cmd.raw_tokens.push(token.clone());

        if token == "--" {
            continue;
        }

        if let Some(long) = token.strip_prefix("--") {
            let flag = long.split('=').next().unwrap_or(long);
            push_flag(&mut cmd.flags, flag);
            continue;
        }

        if token.starts_with('-') && token.len() > 1 && !is_bare_signed_number(token) {
            for ch in token[1..].chars() {
                push_flag(&mut cmd.flags, &ch.to_string());
            }
            continue;
        }

        if is_path_like(token) {
            cmd.path_like_args.push(token.clone());
        }
        cmd.positional_args.push(token.clone());
    }

    if MULTI_VERB_COMMANDS.contains(&basename(&cmd.command)) && !cmd.positional_args.is_empty() {
        cmd.subcommand = Some(cmd.positional_args[0].clone());
        cmd.subcommand_args = cmd.positional_args[1..].to_vec();
    }

    cmd
}

fn push_flag(flags: &mut Vec<String>, flag: &str) {
    if flag.is_empty() {
        return;
    }
    if !flags.iter().any(|f| f == flag) {
        flags.push(flag.to_string());
    }
}

/// True for `-10`, `-3.14`, `-.5`: a leading dash followed only by digits
/// and dots.
fn is_bare_signed_number(token: &str) -> bool {
    let rest = &token[1..];
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn is_path_like(token: &str) -> bool {
    token.starts_with('/')
        || token.starts_with('~')
        || token.starts_with('$')
        || token.starts_with('.')
}

/// Strip any directory prefix from a command word (`/usr/bin/git` → `git`).
#[must_use]
pub fn basename(command: &str) -> &str {
    command.rsplit('/').next().unwrap_or(command)
}
