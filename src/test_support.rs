//! Shared test-only helpers. `$HOME` is process-global, so every test that
//! touches it (directly, or transitively via `plan::store`) must serialize
//! through [`HOME_LOCK`].

use std::sync::Mutex;

pub static HOME_LOCK: Mutex<()> = Mutex::new(());

pub fn with_sandboxed_home<F: FnOnce(&std::path::Path)>(f: F) {
    let _guard = HOME_LOCK.lock().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let prev = std::env::var("HOME").ok();
    std::env::set_var("HOME", dir.path());
    f(dir.path());
    match prev {
        Some(v) => std::env::set_var("HOME", v),
        None => std::env::remove_var("HOME"),
    }
}
