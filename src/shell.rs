//! Shell syntax tree adapter.
//!
//! Parses a raw command line with tree-sitter-bash and lowers the grammar's
//! node zoo into the small tagged union the matcher layers operate on:
//! sequences, pipelines, logical combinators, leaf commands, groupings, and
//! an explicit [`ShellNode::Unknown`] arm for everything else.
//!
//! The lowering is deliberately lossy. Redirections are unwrapped to their
//! body command so `rm -rf / > /dev/null` is still visible; heredocs,
//! control flow, and any construct the grammar knows but we do not are
//! mapped to `Unknown`, which contributes zero commands downstream. Parse
//! failures return `None` and the caller fails open.

use std::sync::{Mutex, OnceLock};
use tree_sitter::{Node, Parser};

/// Lazily-initialized tree-sitter bash parser (wrapped in Mutex for mutation).
static BASH_PARSER: OnceLock<Mutex<Parser>> = OnceLock::new();

fn bash_parser() -> &'static Mutex<Parser> {
    BASH_PARSER.get_or_init(|| {
        let mut parser = Parser::new();
        let lang: tree_sitter::Language = tree_sitter_bash::LANGUAGE.into();
        #[allow(clippy::expect_used)] // grammar load failure is a build defect
        parser.set_language(&lang).expect("load bash grammar");
        Mutex::new(parser)
    })
}

/// A shell command tree, lowered from the bash grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellNode {
    /// Script or statement list: children run in order (`a; b`, newlines).
    Sequence(Vec<ShellNode>),
    /// `a | b | c`: one child per pipeline stage, in order.
    Pipeline(Vec<ShellNode>),
    /// `a && b` or `a || b`.
    Logical {
        left: Box<ShellNode>,
        right: Box<ShellNode>,
    },
    /// A leaf command: resolved name plus raw suffix tokens.
    ///
    /// `name` is `None` when the grammar produced a command node without a
    /// resolvable name text; such nodes are silently skipped downstream.
    Command {
        name: Option<String>,
        suffix: Vec<String>,
    },
    /// Subshell `( … )` or compound list `{ …; }`.
    Grouping(Box<ShellNode>),
    /// Any construct we do not model. Contributes zero commands.
    Unknown,
}

impl ShellNode {
    /// The leaf command name, if this node is a named command.
    #[must_use]
    pub fn command_name(&self) -> Option<&str> {
        match self {
            Self::Command { name, .. } => name.as_deref(),
            _ => None,
        }
    }
}

/// Parse a raw command line into a [`ShellNode`] tree.
///
/// Returns `None` when the grammar reports an error anywhere in the tree or
/// the parser is unavailable. Callers must treat `None` as "not blocked":
/// an unparseable command is outside rule reach by design.
#[must_use]
pub fn parse_shell(text: &str) -> Option<ShellNode> {
    let mut parser = bash_parser().lock().ok()?;
    let tree = parser.parse(text, None)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }
    Some(convert(root, text))
}

fn convert(node: Node, src: &str) -> ShellNode {
    match node.kind() {
        "program" => ShellNode::Sequence(convert_children(node, src)),
        "list" => {
            let children = convert_children(node, src);
            // The grammar's `list` is binary (`a && b`), nesting for chains.
            if children.len() == 2 {
                let mut it = children.into_iter();
                let left = Box::new(it.next().unwrap_or(ShellNode::Unknown));
                let right = Box::new(it.next().unwrap_or(ShellNode::Unknown));
                ShellNode::Logical { left, right }
            } else {
                ShellNode::Sequence(children)
            }
        }
        "pipeline" => ShellNode::Pipeline(convert_children(node, src)),
        "command" => convert_command(node, src),
        "subshell" | "compound_statement" => {
            ShellNode::Grouping(Box::new(ShellNode::Sequence(convert_children(node, src))))
        }
        "redirected_statement" => node
            .child_by_field_name("body")
            .map_or(ShellNode::Unknown, |body| convert(body, src)),
        _ => ShellNode::Unknown,
    }
}

fn convert_children(node: Node, src: &str) -> Vec<ShellNode> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .map(|child| convert(child, src))
        .collect()
}

fn convert_command(node: Node, src: &str) -> ShellNode {
    let mut name = None;
    let mut suffix = Vec::new();

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            // `FOO=1 cmd` prefixes are environment, not arguments.
            "variable_assignment" => {}
            "command_name" => {
                name = command_name_text(child, src);
            }
            _ => {
                if let Some(text) = token_text(child, src) {
                    suffix.push(text);
                }
            }
        }
    }

    ShellNode::Command { name, suffix }
}

fn command_name_text(node: Node, src: &str) -> Option<String> {
    let resolved = match node.named_child(0) {
        Some(inner) => token_text(inner, src),
        None => node.utf8_text(src.as_bytes()).ok().map(str::to_owned),
    };
    resolved.filter(|n| !n.is_empty())
}

/// Extract the argument text for one suffix node.
///
/// Simple quoting is unwrapped (`"word"` and `'word'` become `word`) so flag
/// and path classification sees the effective token; anything more involved
/// (expansions, concatenations) keeps its verbatim source text.
fn token_text(node: Node, src: &str) -> Option<String> {
    let verbatim = node.utf8_text(src.as_bytes()).ok()?;
    match node.kind() {
        "string" => {
            let mut cursor = node.walk();
            let content: Vec<Node> = node.named_children(&mut cursor).collect();
            match content.as_slice() {
                [] => Some(String::new()),
                [only] if only.kind() == "string_content" => {
                    only.utf8_text(src.as_bytes()).ok().map(str::to_owned)
                }
                _ => Some(verbatim.to_owned()),
            }
        }
        "raw_string" => Some(
            verbatim
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .unwrap_or(verbatim)
                .to_owned(),
        ),
        _ => Some(verbatim.to_owned()),
    }
}
