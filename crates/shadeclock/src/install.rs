//! systemd user units that run `shadeclock auto` at every event time.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveTime;
use tracing::info;

pub const UNIT_NAME: &str = "shadeclock";

pub fn service_unit(executable: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=Apply screen shader\n\
         \n\
         [Service]\n\
         Type=oneshot\n\
         ExecStart=\"{}\" auto\n",
        executable.display()
    )
}

pub fn timer_unit(event_times: &[NaiveTime]) -> String {
    let mut calendar: Vec<String> = event_times
        .iter()
        .map(|time| format!("OnCalendar=*-*-* {}", time.format("%H:%M:%S")))
        .collect();
    calendar.sort();
    calendar.dedup();
    format!(
        "[Unit]\n\
         Description=Apply screen shader on schedule\n\
         \n\
         [Timer]\n\
         {}\n\
         \n\
         [Install]\n\
         WantedBy=timers.target\n",
        calendar.join("\n")
    )
}

/// Writes the service and timer into `dir`, returning their paths.
pub fn write_units(
    dir: &Path,
    executable: &Path,
    event_times: &[NaiveTime],
) -> Result<[PathBuf; 2]> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create unit directory {}", dir.display()))?;
    let service = dir.join(format!("{UNIT_NAME}.service"));
    let timer = dir.join(format!("{UNIT_NAME}.timer"));
    for (path, body) in [
        (&service, service_unit(executable)),
        (&timer, timer_unit(event_times)),
    ] {
        fs::write(path, body)
            .with_context(|| format!("failed to write unit file {}", path.display()))?;
        info!(path = %path.display(), "installed systemd unit");
    }
    Ok([service, timer])
}
