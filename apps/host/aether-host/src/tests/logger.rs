// Logger initialization runs once per process, so every call that touches
// the global dispatcher lives in a single test.

use crate::logger::{LOG_FILE_NAME, default_log_dir, initialize};

use std::path::PathBuf;

use tempfile::TempDir;

/// **VALUE**: Verifies both failure and idempotence of logger initialization.
///
/// **WHY THIS MATTERS**: A log directory that cannot be written must surface as a
/// typed error instead of a panic, and a second call from another startup path
/// must not try to install a second global logger.
///
/// **BUG THIS CATCHES**: Would catch if `fern::log_file()` is unwrapped, or if
/// the Once/AtomicBool guards are removed so fern fails on the second `apply()`.
#[test]
fn given_unwritable_log_dir_when_initialize_called_then_error_and_later_calls_are_noops() {
    // GIVEN: A path that cannot hold a log file
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN: Initializing against it
    let first = initialize(&invalid_dir);

    // THEN: A Logger error comes back naming the file
    let err = first.unwrap_err();
    let err_string = format!("{err:?}");
    assert!(err_string.contains("Logger"), "unexpected error: {err_string}");
    assert!(err.to_string().contains(LOG_FILE_NAME));

    // WHEN: Calling again with a valid directory
    let temp_dir = TempDir::new().unwrap();
    let second = initialize(temp_dir.path());

    // THEN: The call is a no-op that succeeds
    assert!(second.is_ok(), "Second initialization should be idempotent");
}

#[test]
fn given_platform_dirs_when_default_log_dir_then_ends_with_aether_logs() {
    let dir = default_log_dir().unwrap();

    assert!(dir.ends_with("aether/logs"), "got {}", dir.display());
}
