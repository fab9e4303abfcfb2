use crate::error::{RunWarning, StitchError};

use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];
pub const DCIM_MOVIE_DIR: &str = "Movie";
pub const PARKING_DIR: &str = "Parking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Driving,
    Parking,
}

impl Provenance {
    pub fn label(self) -> &'static str {
        match self {
            Provenance::Driving => "DRIVING",
            Provenance::Parking => "PARKING",
        }
    }
}

/// One candidate video file. `size_bytes` is `None` when the file could not be stat-ed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub path: PathBuf,
    pub file_name: String,
    pub provenance: Provenance,
    pub size_bytes: Option<u64>,
}

impl Segment {
    pub fn new(path: PathBuf, provenance: Provenance, size_bytes: Option<u64>) -> Self {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            provenance,
            size_bytes,
        }
    }
}

/// Capability flags covering the flat, single-folder and DCIM-aware layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub recursive: bool,
    pub dcim_aware: bool,
    pub parking_aware: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            dcim_aware: true,
            parking_aware: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Directory actually walked (`<root>/Movie` for a DCIM layout).
    pub scan_root: PathBuf,
    pub dcim_detected: bool,
    pub segments: Vec<Segment>,
    pub warnings: Vec<RunWarning>,
}

#[derive(Debug, Clone, Default)]
pub struct SizeTotals {
    pub total_bytes: u64,
    pub warnings: Vec<RunWarning>,
}

impl SizeTotals {
    pub fn total_mb(&self) -> f64 {
        crate::util::bytes_to_mb(self.total_bytes)
    }
}

/// Walk `root` and collect every eligible segment, unsorted.
pub fn scan_segments(root: &Path, options: ScanOptions) -> Result<ScanResult, StitchError> {
    if !root.is_dir() {
        return Err(StitchError::DirectoryNotFound(root.to_path_buf()));
    }
    let root = std::path::absolute(root)?;
    let (scan_root, dcim_detected) = effective_scan_root(&root, options);

    let mut walkers = vec![];
    if options.recursive {
        walkers.push(WalkDir::new(&scan_root));
    } else {
        walkers.push(WalkDir::new(&scan_root).max_depth(1));
        let parking = scan_root.join(PARKING_DIR);
        if options.parking_aware && parking.is_dir() {
            walkers.push(WalkDir::new(parking).max_depth(1));
        }
    }

    let mut segments = vec![];
    let mut warnings = vec![];
    for walker in walkers {
        let entries = walker
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in entries {
            let e = match entry {
                Ok(e) => e,
                Err(err) => {
                    warnings.push(RunWarning::ScanEntrySkipped(err.to_string()));
                    continue;
                }
            };
            if !has_video_extension(e.path()) {
                continue;
            }
            // Links are not followed during the walk; a link to a file still counts.
            let size_bytes = if e.file_type().is_file() {
                e.metadata().ok().map(|m| m.len())
            } else if e.path_is_symlink() {
                match std::fs::metadata(e.path()) {
                    Ok(m) if m.is_file() => Some(m.len()),
                    Ok(_) => continue,
                    Err(err) => {
                        warnings.push(RunWarning::ScanEntrySkipped(format!(
                            "{}: {}",
                            e.path().display(),
                            err
                        )));
                        continue;
                    }
                }
            } else {
                continue;
            };
            if let Some(reason) = unusable_path_reason(e.path()) {
                warnings.push(RunWarning::SegmentPathUnusable {
                    path: e.path().to_string_lossy().to_string(),
                    reason,
                });
                continue;
            }

            let provenance = if options.parking_aware && under_parking(&scan_root, e.path()) {
                Provenance::Parking
            } else {
                Provenance::Driving
            };
            segments.push(Segment::new(e.path().to_path_buf(), provenance, size_bytes));
        }
    }

    Ok(ScanResult {
        scan_root,
        dcim_detected,
        segments,
        warnings,
    })
}

pub fn effective_scan_root(root: &Path, options: ScanOptions) -> (PathBuf, bool) {
    let movie = root.join(DCIM_MOVIE_DIR);
    if options.dcim_aware && movie.is_dir() {
        (movie, true)
    } else {
        (root.to_path_buf(), false)
    }
}

/// Sort by base name, ties broken by the full path string.
pub fn order_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.sort_by(compare_segments);
    segments
}

fn compare_segments(a: &Segment, b: &Segment) -> Ordering {
    a.file_name
        .cmp(&b.file_name)
        .then_with(|| a.path.to_string_lossy().cmp(&b.path.to_string_lossy()))
}

/// Unreadable segments contribute 0 bytes and one warning each.
pub fn accumulate_sizes(segments: &[Segment]) -> SizeTotals {
    let mut totals = SizeTotals::default();
    for seg in segments {
        match seg.size_bytes {
            Some(bytes) => totals.total_bytes = totals.total_bytes.saturating_add(bytes),
            None => totals.warnings.push(RunWarning::StatFailed {
                file: seg.file_name.clone(),
                reason: "metadata unavailable".to_string(),
            }),
        }
    }
    totals
}

pub fn provenance_counts(segments: &[Segment]) -> (usize, usize) {
    let parking = segments
        .iter()
        .filter(|s| s.provenance == Provenance::Parking)
        .count();
    (segments.len() - parking, parking)
}

pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Why `path` cannot be written as a single concat-list token, if it can't.
pub fn unusable_path_reason(path: &Path) -> Option<&'static str> {
    match path.to_str() {
        None => Some("name is not valid UTF-8"),
        Some(s) if s.contains(['\n', '\r']) => Some("name contains a line break"),
        Some(_) => None,
    }
}

// Covers macOS "._" sidecars as well.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn under_parking(scan_root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(scan_root).unwrap_or(path);
    rel.parent()
        .map(|dir| dir.components().any(|c| c.as_os_str() == PARKING_DIR))
        .unwrap_or(false)
}
