//! Declarative allow/block rules and the per-command matcher.
//!
//! A [`Rule`] is a conjunction of optional filters over a
//! [`StructuredCommand`]: command name, subcommand, flags, path patterns,
//! and argument patterns. Absent filters are automatically satisfied. Allow
//! rules are a narrower containment-style whitelist: they support only the
//! command and path-pattern filters.
//!
//! Rules carrying `pipe_targets` are pipeline-only and never evaluated here;
//! see [`crate::pipeline`].

use crate::extract::{StructuredCommand, basename};
use crate::path::normalize_path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Command-name filter: a single name or a set of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandFilter {
    One(String),
    Many(Vec<String>),
}

impl CommandFilter {
    /// Match against a command word. Comparison is by basename, so
    /// `/usr/bin/git` matches a `git` filter.
    #[must_use]
    pub fn matches(&self, command: &str) -> bool {
        let name = basename(command);
        match self {
            Self::One(c) => c == name,
            Self::Many(cs) => cs.iter().any(|c| c == name),
        }
    }
}

/// How the flag filter combines its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagMode {
    /// Every listed flag must be present.
    #[default]
    All,
    /// At least one listed flag must be present.
    Any,
}

/// One declarative rule. Immutable configuration, loaded once per process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// Unique, human-readable identifier (e.g. `rm-recursive-force`).
    pub name: String,
    /// Free text shown to the operator/agent on block.
    pub reason: String,
    /// Command-name filter; absent means wildcard.
    pub command: Option<CommandFilter>,
    /// Exact subcommand match (block rules only).
    pub subcommand: Option<String>,
    /// Flag predicate, combined per `flag_mode`.
    pub flags: Vec<String>,
    pub flag_mode: FlagMode,
    /// Regexes tested against path-like arguments (or positional args when
    /// no token was classified as a path).
    pub path_patterns: Vec<String>,
    /// Regexes tested against the space-joined raw tokens (block rules only).
    pub arg_patterns: Vec<String>,
    /// Pipeline consumer names; when non-empty the rule is pipeline-only.
    pub pipe_targets: Vec<String>,
}

impl Rule {
    /// True when this rule is evaluated by the pipeline matcher instead of
    /// the per-command matcher.
    #[must_use]
    pub fn is_pipeline_rule(&self) -> bool {
        !self.pipe_targets.is_empty()
    }
}

/// Ordered allow and block rule lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub allow: Vec<Rule>,
    pub block: Vec<Rule>,
}

/// Read-through cache of compiled rule patterns.
///
/// Compilation dominates matching cost, so each pattern string is compiled
/// exactly once per cache. Failures are cached too: a pattern that does not
/// compile never matches (configuration defects are caught at load time and
/// by the built-in pattern audit test, not here). The map is append-only
/// behind a mutex, so a cache can be shared across concurrent evaluations.
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: Mutex<HashMap<String, Option<Regex>>>,
}

impl RegexCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile-or-fetch a pattern. `None` means the pattern is invalid.
    #[must_use]
    pub fn get(&self, pattern: &str) -> Option<Regex> {
        let Ok(mut map) = self.compiled.lock() else {
            // Poisoned lock: compile uncached rather than fail the check.
            return Regex::new(pattern).ok();
        };
        map.entry(pattern.to_string())
            .or_insert_with(|| Regex::new(pattern).ok())
            .clone()
    }

    /// Test a pattern against text; invalid patterns never match.
    #[must_use]
    pub fn is_match(&self, pattern: &str, text: &str) -> bool {
        self.get(pattern).is_some_and(|re| re.is_match(text))
    }
}

/// Evaluate a block rule against one structured command.
///
/// A short-circuiting conjunction over the present filters; pipeline-only
/// rules never match here.
#[must_use]
pub fn matches_block(cmd: &StructuredCommand, rule: &Rule, cache: &RegexCache) -> bool {
    if rule.is_pipeline_rule() {
        return false;
    }

    if let Some(filter) = &rule.command {
        if !filter.matches(&cmd.command) {
            return false;
        }
    }

    if let Some(sub) = &rule.subcommand {
        if cmd.subcommand.as_deref() != Some(sub.as_str()) {
            return false;
        }
    }

    if !flags_satisfied(cmd, rule) {
        return false;
    }

    if !rule.path_patterns.is_empty() && !block_paths_match(cmd, rule, cache) {
        return false;
    }

    if !rule.arg_patterns.is_empty() {
        let joined = cmd.joined_args();
        if !rule
            .arg_patterns
            .iter()
            .any(|p| cache.is_match(p, &joined))
        {
            return false;
        }
    }

    true
}

/// Evaluate an allow rule against one structured command.
///
/// Allow rules are containment checks: command filter plus path patterns
/// tested against the authoritative form of each candidate (normalized when
/// traversal was detected, original otherwise). A traversal-disguised path
/// therefore cannot ride an allow prefix out of its sandbox.
#[must_use]
pub fn matches_allow(cmd: &StructuredCommand, rule: &Rule, cache: &RegexCache) -> bool {
    if rule.is_pipeline_rule() {
        return false;
    }

    if let Some(filter) = &rule.command {
        if !filter.matches(&cmd.command) {
            return false;
        }
    }

    if rule.path_patterns.is_empty() {
        return true;
    }

    let candidates = path_candidates(cmd);
    if candidates.is_empty() {
        // A rule requiring path evidence never matches a pathless command.
        return false;
    }

    candidates.iter().any(|candidate| {
        let info = normalize_path(candidate);
        let text = info.authoritative();
        rule.path_patterns.iter().any(|p| cache.is_match(p, text))
    })
}

fn flags_satisfied(cmd: &StructuredCommand, rule: &Rule) -> bool {
    if rule.flags.is_empty() {
        return true;
    }
    match rule.flag_mode {
        FlagMode::All => rule.flags.iter().all(|f| cmd.has_flag(f)),
        FlagMode::Any => rule.flags.iter().any(|f| cmd.has_flag(f)),
    }
}

/// Block-side path filter: a pattern matches when it tests true against
/// either the original or the normalized form of any candidate. This is what
/// catches `rm /tmp/../etc` against an `^/etc` pattern.
fn block_paths_match(cmd: &StructuredCommand, rule: &Rule, cache: &RegexCache) -> bool {
    let candidates = path_candidates(cmd);
    if candidates.is_empty() {
        return false;
    }

    candidates.iter().any(|candidate| {
        let info = normalize_path(candidate);
        rule.path_patterns.iter().any(|p| {
            cache.is_match(p, &info.original) || cache.is_match(p, &info.normalized)
        })
    })
}

fn path_candidates(cmd: &StructuredCommand) -> &[String] {
    if cmd.path_like_args.is_empty() {
        &cmd.positional_args
    } else {
        &cmd.path_like_args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse_command;

    fn cmd(name: &str, tokens: &[&str]) -> StructuredCommand {
        let suffix: Vec<String> = tokens.iter().map(|t| (*t).to_string()).collect();
        parse_command(name, &suffix)
    }

    fn rm_rf_rule() -> Rule {
        Rule {
            name: "rm-recursive-force".into(),
            reason: "recursive force delete".into(),
            command: Some(CommandFilter::One("rm".into())),
            flags: vec!["r".into(), "f".into()],
            ..Rule::default()
        }
    }

    #[test]
    fn test_block_flags_all_mode() {
        let cache = RegexCache::new();
        let rule = rm_rf_rule();
        assert!(matches_block(&cmd("rm", &["-rf", "/"]), &rule, &cache));
        assert!(matches_block(&cmd("rm", &["-r", "-f", "x"]), &rule, &cache));
        assert!(!matches_block(&cmd("rm", &["-r", "x"]), &rule, &cache));
        assert!(!matches_block(&cmd("rm", &["temp.txt"]), &rule, &cache));
    }

    #[test]
    fn test_block_flags_any_mode() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "git-clean-force".into(),
            reason: "clean".into(),
            command: Some(CommandFilter::One("git".into())),
            subcommand: Some("clean".into()),
            flags: vec!["f".into(), "force".into()],
            flag_mode: FlagMode::Any,
            ..Rule::default()
        };
        assert!(matches_block(&cmd("git", &["clean", "-fd"]), &rule, &cache));
        assert!(matches_block(
            &cmd("git", &["clean", "--force"]),
            &rule,
            &cache
        ));
        assert!(!matches_block(&cmd("git", &["clean", "-n"]), &rule, &cache));
    }

    #[test]
    fn test_block_subcommand_exact() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "git-force-push".into(),
            reason: "force push".into(),
            command: Some(CommandFilter::One("git".into())),
            subcommand: Some("push".into()),
            flags: vec!["force".into()],
            ..Rule::default()
        };
        assert!(matches_block(
            &cmd("git", &["push", "--force", "origin", "main"]),
            &rule,
            &cache
        ));
        // --force-with-lease parses to a different flag name.
        assert!(!matches_block(
            &cmd("git", &["push", "--force-with-lease"]),
            &rule,
            &cache
        ));
        assert!(!matches_block(
            &cmd("git", &["pull", "--force"]),
            &rule,
            &cache
        ));
    }

    #[test]
    fn test_block_command_set() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "mkfs".into(),
            reason: "formats a filesystem".into(),
            command: Some(CommandFilter::Many(vec![
                "mkfs".into(),
                "mkfs.ext4".into(),
            ])),
            ..Rule::default()
        };
        assert!(matches_block(&cmd("mkfs.ext4", &["/dev/sda1"]), &rule, &cache));
        assert!(matches_block(&cmd("/sbin/mkfs", &[]), &rule, &cache));
        assert!(!matches_block(&cmd("mkdir", &["x"]), &rule, &cache));
    }

    #[test]
    fn test_block_path_pattern_matches_normalized_form() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "rm-system-path".into(),
            reason: "system path".into(),
            command: Some(CommandFilter::One("rm".into())),
            path_patterns: vec![r"^/etc(/|$)".into()],
            ..Rule::default()
        };
        assert!(matches_block(&cmd("rm", &["/etc/passwd"]), &rule, &cache));
        // Traversal-disguised: original does not match, normalized does.
        assert!(matches_block(
            &cmd("rm", &["/tmp/../etc/passwd"]),
            &rule,
            &cache
        ));
        assert!(!matches_block(&cmd("rm", &["/tmp/etc"]), &rule, &cache));
    }

    #[test]
    fn test_path_filter_fails_on_pathless_command() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "p".into(),
            reason: "r".into(),
            path_patterns: vec![".*".into()],
            ..Rule::default()
        };
        assert!(!matches_block(&cmd("sync", &[]), &rule, &cache));
        assert!(!matches_allow(&cmd("sync", &[]), &rule, &cache));
    }

    #[test]
    fn test_path_filter_falls_back_to_positionals() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "p".into(),
            reason: "r".into(),
            path_patterns: vec![r"^/secret".into()],
            ..Rule::default()
        };
        // "secret/file" is not path-like but normalizes to /secret/file.
        assert!(matches_block(&cmd("rm", &["secret/file"]), &rule, &cache));
    }

    #[test]
    fn test_block_arg_pattern_on_joined_tokens() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "dd-device".into(),
            reason: "writes a block device".into(),
            command: Some(CommandFilter::One("dd".into())),
            arg_patterns: vec![r"(^|\s)of=/dev/".into()],
            ..Rule::default()
        };
        assert!(matches_block(
            &cmd("dd", &["if=/dev/zero", "of=/dev/sda"]),
            &rule,
            &cache
        ));
        assert!(!matches_block(
            &cmd("dd", &["if=/dev/zero", "of=disk.img"]),
            &rule,
            &cache
        ));
    }

    #[test]
    fn test_allow_containment_authoritative_form() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "rm-tmp".into(),
            reason: "scratch space".into(),
            command: Some(CommandFilter::One("rm".into())),
            path_patterns: vec![r"^/tmp/".into()],
            ..Rule::default()
        };
        assert!(matches_allow(&cmd("rm", &["-rf", "/tmp/foo"]), &rule, &cache));
        // Traversal switches the authoritative form to the normalized path,
        // which escapes /tmp and must not be allowed.
        assert!(!matches_allow(
            &cmd("rm", &["-rf", "/tmp/../etc"]),
            &rule,
            &cache
        ));
    }

    #[test]
    fn test_allow_wrong_command_rejected() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "rm-tmp".into(),
            reason: "scratch".into(),
            command: Some(CommandFilter::One("rm".into())),
            path_patterns: vec![r"^/tmp/".into()],
            ..Rule::default()
        };
        assert!(!matches_allow(&cmd("shred", &["/tmp/foo"]), &rule, &cache));
    }

    #[test]
    fn test_pipeline_rule_never_matches_per_command() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "curl-pipe-shell".into(),
            reason: "pipe to shell".into(),
            command: Some(CommandFilter::One("curl".into())),
            pipe_targets: vec!["bash".into()],
            ..Rule::default()
        };
        assert!(!matches_block(&cmd("curl", &["https://x"]), &rule, &cache));
        assert!(!matches_allow(&cmd("curl", &["https://x"]), &rule, &cache));
    }

    #[test]
    fn test_wildcard_command_filter() {
        let cache = RegexCache::new();
        let rule = Rule {
            name: "any-system-write".into(),
            reason: "touches /boot".into(),
            path_patterns: vec![r"^/boot(/|$)".into()],
            ..Rule::default()
        };
        assert!(matches_block(&cmd("cp", &["x", "/boot/y"]), &rule, &cache));
        assert!(matches_block(&cmd("mv", &["/boot/z", "b"]), &rule, &cache));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let cache = RegexCache::new();
        assert!(!cache.is_match("([unclosed", "anything"));
        // Cached failure: second lookup takes the same path.
        assert!(!cache.is_match("([unclosed", "anything"));
    }

    #[test]
    fn test_cache_reuses_compiled_regex() {
        let cache = RegexCache::new();
        assert!(cache.is_match("^a+$", "aaa"));
        assert!(cache.is_match("^a+$", "aa"));
        let map = cache.compiled.lock().unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_rule_toml_round_trip() {
        let toml_src = r#"
            name = "git-force-push"
            reason = "force push rewrites remote history"
            command = "git"
            subcommand = "push"
            flags = ["force"]
            flag_mode = "all"
        "#;
        let rule: Rule = toml::from_str(toml_src).unwrap();
        assert_eq!(rule.name, "git-force-push");
        assert_eq!(rule.flag_mode, FlagMode::All);
        assert!(matches!(rule.command, Some(CommandFilter::One(ref c)) if c == "git"));
    }
}
