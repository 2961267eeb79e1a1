//! Built-in rule set.
//!
//! A curated default covering the hazards agents hit most: recursive
//! deletes, history-destroying git operations, network fetches piped into
//! interpreters, raw device writes, and filesystem formatting. User and
//! project configuration prepend their own rules; these stay as the
//! baseline unless explicitly disabled.
//!
//! Every pattern shipped here must compile; the audit test at the bottom
//! walks the whole set.

use crate::rules::{CommandFilter, FlagMode, Rule, RuleSet};

fn one(command: &str) -> Option<CommandFilter> {
    Some(CommandFilter::One(command.to_string()))
}

fn many(commands: &[&str]) -> Option<CommandFilter> {
    Some(CommandFilter::Many(
        commands.iter().map(|c| (*c).to_string()).collect(),
    ))
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// The compiled-in default rule set.
#[must_use]
pub fn default_rules() -> RuleSet {
    RuleSet {
        block: vec![
            Rule {
                name: "rm-recursive-force".into(),
                reason: "rm with recursive and force flags deletes trees \
                         irreversibly. Explain what should be deleted and ask \
                         the user to run it manually."
                    .into(),
                command: one("rm"),
                flags: strs(&["r", "f"]),
                ..Rule::default()
            },
            Rule {
                name: "rm-recursive-force-long".into(),
                reason: "rm --recursive --force deletes trees irreversibly \
                         and requires human approval."
                    .into(),
                command: one("rm"),
                flags: strs(&["recursive", "force"]),
                ..Rule::default()
            },
            Rule {
                name: "rm-system-path".into(),
                reason: "rm targeting the filesystem root or a system \
                         directory is not recoverable."
                    .into(),
                command: one("rm"),
                path_patterns: strs(&[
                    r"^/+$",
                    r"^/(etc|usr|boot|bin|sbin|lib|lib64|opt|srv|home|root)(/|$)",
                    r"^/var(/|$)",
                ]),
                ..Rule::default()
            },
            Rule {
                name: "git-force-push".into(),
                reason: "git push --force rewrites remote history. Use \
                         --force-with-lease, or ask the user to push manually."
                    .into(),
                command: one("git"),
                subcommand: Some("push".into()),
                flags: strs(&["force"]),
                ..Rule::default()
            },
            Rule {
                name: "git-reset-hard".into(),
                reason: "git reset --hard destroys uncommitted changes. \
                         Stash first, or ask the user to run it."
                    .into(),
                command: one("git"),
                subcommand: Some("reset".into()),
                flags: strs(&["hard"]),
                ..Rule::default()
            },
            Rule {
                name: "git-clean-force".into(),
                reason: "git clean -f permanently removes untracked files. \
                         Preview with git clean -n first."
                    .into(),
                command: one("git"),
                subcommand: Some("clean".into()),
                flags: strs(&["f", "force"]),
                flag_mode: FlagMode::Any,
                ..Rule::default()
            },
            Rule {
                name: "curl-pipe-shell".into(),
                reason: "piping a network fetch into a shell executes \
                         unreviewed remote code."
                    .into(),
                command: many(&["curl", "wget", "fetch"]),
                pipe_targets: strs(&["bash", "sh", "zsh", "dash", "ksh"]),
                ..Rule::default()
            },
            Rule {
                name: "curl-pipe-interpreter".into(),
                reason: "piping a network fetch into an interpreter executes \
                         unreviewed remote code."
                    .into(),
                command: many(&["curl", "wget", "fetch"]),
                pipe_targets: strs(&["python", "python2", "python3", "perl", "ruby", "node"]),
                ..Rule::default()
            },
            Rule {
                name: "dd-block-device".into(),
                reason: "dd writing to a block device overwrites it at the \
                         byte level."
                    .into(),
                command: one("dd"),
                arg_patterns: strs(&[r"(^|\s)of=/dev/"]),
                ..Rule::default()
            },
            Rule {
                name: "mkfs".into(),
                reason: "mkfs formats a filesystem, destroying its contents."
                    .into(),
                command: many(&[
                    "mkfs",
                    "mkfs.ext2",
                    "mkfs.ext3",
                    "mkfs.ext4",
                    "mkfs.xfs",
                    "mkfs.btrfs",
                    "mkfs.vfat",
                ]),
                ..Rule::default()
            },
            Rule {
                name: "chmod-world-writable-root".into(),
                reason: "recursive chmod 777 from a system root breaks \
                         permissions across the machine."
                    .into(),
                command: one("chmod"),
                flags: strs(&["R"]),
                arg_patterns: strs(&[r"(^|\s)777\s+/(\s|$)"]),
                ..Rule::default()
            },
        ],
        allow: vec![Rule {
            name: "rm-scratch-space".into(),
            reason: "deleting under the shared scratch directories is \
                     routine cleanup."
                .into(),
            command: one("rm"),
            path_patterns: strs(&[
                r"^/tmp/",
                r"^/var/tmp/",
                r"^/private/tmp/",
                r"^\$TMPDIR(/|$)",
            ]),
            ..Rule::default()
        }],
    }
}
