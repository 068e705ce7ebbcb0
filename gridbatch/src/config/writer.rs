//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use super::duration::format_duration;
use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[update]
; Delay between two updates of an execution right after its state changed.
; Durations accept ISO-8601 (PT2M, PT1H30M, PT45S) or short forms (500ms, 90s, 2m, 1h).
min_interval = {}
; Upper bound of the delay while the state of an execution does not change.
max_interval = {}
; Growth of the delay for every update that sees no state change.
increment = {}

[pools]
; Number of concurrent input uploads (default: 16)
upload = {}
; Number of concurrent result downloads (default: 16)
download = {}
; Number of concurrent communication directory removals (default: 4)
remove = {}
; Number of concurrent remote job kills (default: 4)
kill = {}

[environment]
; Number of concurrent submissions to a single job service (default: 8)
max_concurrent_submissions = {}

[logging]
; Directory holding the log file, relative to the working directory unless absolute.
directory = {}
; Log file name. The file is cleared at the start of every session.
file = {}
"#,
        format_duration(config.update.min_interval),
        format_duration(config.update.max_interval),
        format_duration(config.update.increment),
        config.pools.upload,
        config.pools.download,
        config.pools.remove,
        config.pools.kill,
        config.environment.max_concurrent_submissions,
        config.logging.directory.to_string_lossy(),
        config.logging.file,
    )
}
