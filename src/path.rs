//! Path normalization for containment checks.
//!
//! Rule patterns are matched against both the literal path text an agent
//! supplied and a normalized absolute form, so `rm -rf /tmp/../etc` cannot
//! disguise a protected target behind traversal segments.
//!
//! Normalization is purely textual: no filesystem I/O is performed and
//! symlinks are not resolved. The normalized form exists for prefix
//! containment checks, not for literal path resolution.

/// Result of normalizing one path-like argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    /// The input text, verbatim.
    pub original: String,
    /// Absolute-form path after resolving `.`/`..` segments and expanding `~`.
    pub normalized: String,
    /// True iff the original text contains the literal substring `..`.
    pub has_traversal: bool,
    /// True iff the original starts with `/` or `~`.
    pub is_absolute: bool,
}

impl PathInfo {
    /// The form that should be used for containment checks: the normalized
    /// path when traversal was detected, otherwise the original text.
    #[must_use]
    pub fn authoritative(&self) -> &str {
        if self.has_traversal {
            &self.normalized
        } else {
            &self.original
        }
    }
}

/// Normalize a path-like string.
///
/// `~` is expanded to the home directory before traversal resolution. The
/// result is always absolute-style (`/` + joined segments) even for relative
/// input, since it is only used for containment checks. Resolving `..` past
/// the root is clamped: popping an empty segment stack is a no-op.
///
/// Empty input yields an all-empty/false [`PathInfo`], not an error.
#[must_use]
pub fn normalize_path(path: &str) -> PathInfo {
    if path.is_empty() {
        return PathInfo {
            original: String::new(),
            normalized: String::new(),
            has_traversal: false,
            is_absolute: false,
        };
    }

    let has_traversal = path.contains("..");
    let is_absolute = path.starts_with('/') || path.starts_with('~');

    let expanded = expand_home(path);

    let mut stack: Vec<&str> = Vec::new();
    for segment in expanded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    let mut normalized = String::with_capacity(expanded.len() + 1);
    normalized.push('/');
    normalized.push_str(&stack.join("/"));

    PathInfo {
        original: path.to_string(),
        normalized,
        has_traversal,
        is_absolute,
    }
}

/// Expand a leading `~` or `~/` to the home directory.
///
/// `~user` forms are left alone; only the invoking user's home is known.
fn expand_home(path: &str) -> String {
    if path == "~" {
        return home_dir_string();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        let mut out = home_dir_string();
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(rest);
        return out;
    }
    path.to_string()
}

fn home_dir_string() -> String {
    dirs::home_dir().map_or_else(|| "/".to_string(), |h| h.to_string_lossy().into_owned())
}
