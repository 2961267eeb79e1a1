// Forbid unsafe code in production, but allow in tests for env var manipulation
#![cfg_attr(not(test), forbid(unsafe_code))]
//! cmdgate library.
//!
//! This library provides the core functionality for gating shell commands
//! proposed by AI coding agents. Commands are parsed into a syntax tree,
//! flattened into structured command records, and matched against declarative
//! allow/block rules before execution. A sibling subsystem offloads oversized
//! command output to scratch files after execution.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Configuration                             │
//! │    (env vars → project config → user config → built-in rules)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Guard                                 │
//! │   fast path → parse → pipeline matcher → per-command matcher    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │  Extractor   │  │ Rule Matcher │  │ Pipe Matcher │
//! │ (shell tree) │  │ (allow/block)│  │ (curl | sh)  │
//! └──────────────┘  └──────────────┘  └──────────────┘
//! ```
//!
//! # Usage
//!
//! The main entry point for command evaluation is the [`guard`] module:
//!
//! ```ignore
//! use cmdgate::defaults::default_rules;
//! use cmdgate::guard::Guard;
//!
//! let guard = Guard::new(default_rules());
//! let result = guard.evaluate("rm -rf /");
//!
//! if result.blocked {
//!     let rule = result.matched_rule.as_ref().unwrap();
//!     println!("Blocked by {}: {}", rule.name, rule.reason);
//! }
//! ```
//!
//! The guard fails open by design: unparseable input, unknown syntax, and
//! internal errors all resolve to "not blocked". Availability of the agent
//! loop is prioritized over strictness; rule breadth plus the pipeline
//! matcher is the primary defense.

pub mod cli;
pub mod config;
pub mod defaults;
pub mod extract;
pub mod guard;
pub mod hook;
pub mod logging;
pub mod offload;
pub mod path;
pub mod pipeline;
pub mod rules;
pub mod shell;

// Re-export commonly used types
pub use config::Config;
pub use extract::{StructuredCommand, extract_commands, parse_command};
pub use guard::{CheckResult, Guard};
pub use hook::{HookInput, HookOutput, HookSpecificOutput};
pub use offload::{OffloadConfig, OffloadResult, offload_output};
pub use path::{PathInfo, normalize_path};
pub use pipeline::match_pipeline;
pub use rules::{CommandFilter, FlagMode, RegexCache, Rule, RuleSet};
pub use shell::{ShellNode, parse_shell};
