use crate::error::StitchError;

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

pub fn ensure_muxer_available(program: &Path) -> Result<(), StitchError> {
    let out = Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| StitchError::MuxerNotFound {
            program: program.to_path_buf(),
            reason: e.to_string(),
        })?;
    if !out.status.success() {
        return Err(StitchError::MuxerNotFound {
            program: program.to_path_buf(),
            reason: format!("'-version' returned {}", out.status),
        });
    }
    Ok(())
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}
