//! Output offloading for oversized command output.
//!
//! Agent loops choke on multi-megabyte tool output. This subsystem takes a
//! text blob and its exit code: under the token threshold the text passes
//! through unchanged; over it, the full text is written to a content-hashed
//! file under a scratch directory and replaced by a short pointer message
//! with a tail preview.
//!
//! Scratch hygiene: files older than the configured age are evicted first,
//! then least-recently-modified files until the directory fits the size cap.
//!
//! This module is independent of the guard; the CLI layer composes the two.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Rough bytes-per-token estimate used to convert byte lengths to the token
/// thresholds the configuration speaks in.
const BYTES_PER_TOKEN: usize = 4;

/// Offload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Output at or under this many (estimated) tokens passes through.
    pub max_tokens: usize,
    /// Size of the tail preview included in the pointer message.
    pub preview_tokens: usize,
    /// Scratch directory; defaults to `~/.cache/cmdgate/scratch`.
    pub scratch_dir: Option<String>,
    /// Evict scratch files older than this.
    pub max_age_minutes: u64,
    /// Evict least-recently-modified files beyond this total size.
    pub max_scratch_size_mb: u64,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10_000,
            preview_tokens: 500,
            scratch_dir: None,
            max_age_minutes: 24 * 60,
            max_scratch_size_mb: 200,
        }
    }
}

impl OffloadConfig {
    /// Resolve the scratch directory, falling back to the user cache dir.
    #[must_use]
    pub fn scratch_path(&self) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("cmdgate")
                .join("scratch"),
        }
    }
}

/// Result of one offload decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffloadResult {
    /// Under the threshold; the caller forwards the original text.
    Unchanged,
    /// Offloaded: the caller forwards `message` instead of the text.
    Offloaded {
        /// Where the full output was written.
        path: PathBuf,
        /// Pointer message with tail preview.
        message: String,
    },
}

/// Apply the offload policy to one output blob.
///
/// # Errors
///
/// Returns I/O errors from creating the scratch directory or writing the
/// output file. Eviction failures are swallowed; losing a cleanup pass is
/// preferable to losing the output.
pub fn offload_output(
    text: &str,
    exit_code: i32,
    config: &OffloadConfig,
) -> io::Result<OffloadResult> {
    let tokens = estimate_tokens(text);
    if tokens <= config.max_tokens {
        return Ok(OffloadResult::Unchanged);
    }

    let dir = config.scratch_path();
    fs::create_dir_all(&dir)?;

    let path = dir.join(format!("out-{}.txt", content_hash(text)));
    fs::write(&path, text)?;

    // Cleanup after the write so the new file is never its own victim of
    // an age sweep, only of the size cap.
    let _ = evict_scratch(
        &dir,
        Duration::from_secs(config.max_age_minutes * 60),
        config.max_scratch_size_mb * 1024 * 1024,
        Some(&path),
    );

    let preview = tail_preview(text, config.preview_tokens * BYTES_PER_TOKEN);
    let message = format!(
        "[cmdgate] output of ~{tokens} tokens (exit {exit_code}) exceeds the \
         {max} token limit.\nFull output saved to: {path}\n\n--- tail ---\n{preview}",
        max = config.max_tokens,
        path = path.display(),
    );

    Ok(OffloadResult::Offloaded { path, message })
}

/// Estimated token count of a text blob.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// The last `max_bytes` of the text, snapped to a character boundary and,
/// when possible, to a line start.
fn tail_preview(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    match tail.find('\n') {
        Some(nl) if nl + 1 < tail.len() => &tail[nl + 1..],
        _ => tail,
    }
}

/// Evict scratch files by age, then by least-recently-modified until the
/// directory is under the size budget. `keep` is never evicted.
fn evict_scratch(
    dir: &Path,
    max_age: Duration,
    max_total_bytes: u64,
    keep: Option<&Path>,
) -> io::Result<()> {
    let now = SystemTime::now();
    let mut entries: Vec<(PathBuf, SystemTime, u64)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || keep == Some(path.as_path()) {
            continue;
        }
        let meta = entry.metadata()?;
        let modified = meta.modified().unwrap_or(now);
        entries.push((path, modified, meta.len()));
    }

    // Age sweep first.
    entries.retain(|(path, modified, _)| {
        let expired = now
            .duration_since(*modified)
            .map(|age| age > max_age)
            .unwrap_or(false);
        if expired {
            let _ = fs::remove_file(path);
        }
        !expired
    });

    // Size sweep: oldest modification evicted first.
    let keep_len = keep.and_then(|p| fs::metadata(p).ok()).map_or(0, |m| m.len());
    let mut total: u64 = entries.iter().map(|(_, _, len)| len).sum::<u64>() + keep_len;
    entries.sort_by_key(|(_, modified, _)| *modified);
    for (path, _, len) in entries {
        if total <= max_total_bytes {
            break;
        }
        if fs::remove_file(&path).is_ok() {
            total = total.saturating_sub(len);
        }
    }

    Ok(())
}
