use crate::shared::state_paths::StatePaths;
use std::fs;
use std::io::Write;

/// Appends one engine log line. Logging is best-effort: a full disk or a
/// missing state root must never fail the workflow itself.
pub fn append_engine_log(paths: &StatePaths, level: &str, event: &str, message: &str) {
    let path = paths.engine_log_file();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let _ = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| writeln!(file, "{stamp} {level} {event} {message}"));
}
