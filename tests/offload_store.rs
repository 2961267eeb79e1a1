//! Scratch-store behavior of the output offloader.

use cmdgate::offload::{OffloadConfig, OffloadResult, offload_output};
use std::fs;
use std::path::Path;

fn config_in(dir: &Path) -> OffloadConfig {
    OffloadConfig {
        max_tokens: 10,
        preview_tokens: 16,
        scratch_dir: Some(dir.to_string_lossy().into_owned()),
        max_age_minutes: 60,
        max_scratch_size_mb: 1,
    }
}

#[test]
fn pass_through_under_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let result = offload_output("ok\n", 0, &config_in(dir.path())).unwrap();
    assert_eq!(result, OffloadResult::Unchanged);
}

#[test]
fn offloaded_file_holds_full_output() {
    let dir = tempfile::tempdir().unwrap();
    let text: String = (0..200).map(|i| format!("line {i}\n")).collect();

    let result = offload_output(&text, 1, &config_in(dir.path())).unwrap();
    let OffloadResult::Offloaded { path, message } = result else {
        panic!("expected offload");
    };

    assert_eq!(fs::read_to_string(&path).unwrap(), text);
    assert!(message.contains("exit 1"));
    assert!(message.contains(&path.display().to_string()));
    // The preview is the tail, not the head.
    assert!(message.contains("line 199"));
    assert!(!message.contains("line 0\n"));
}

#[test]
fn repeated_output_reuses_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let text = "repeat ".repeat(50);

    offload_output(&text, 0, &config).unwrap();
    offload_output(&text, 0, &config).unwrap();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn distinct_outputs_get_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    offload_output(&"a".repeat(100), 0, &config).unwrap();
    offload_output(&"b".repeat(100), 0, &config).unwrap();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn size_cap_evicts_older_entries_but_keeps_newest() {
    let dir = tempfile::tempdir().unwrap();
    let config = OffloadConfig {
        // ~600 KB per blob against a 1 MB cap: the second offload must
        // evict the first.
        max_tokens: 10,
        ..config_in(dir.path())
    };

    let first = "a".repeat(600 * 1024);
    let second = "b".repeat(600 * 1024);

    let OffloadResult::Offloaded { path: first_path, .. } =
        offload_output(&first, 0, &config).unwrap()
    else {
        panic!("expected offload");
    };
    let OffloadResult::Offloaded { path: second_path, .. } =
        offload_output(&second, 0, &config).unwrap()
    else {
        panic!("expected offload");
    };

    assert!(second_path.exists());
    assert!(!first_path.exists(), "older blob should be evicted");
}
