use crate::error::{RunWarning, StitchError};
use crate::manifest::ConcatManifest;
use crate::output::{resolve_output_path, DestPolicy};
use crate::progress::{ProgressHandle, RunReport};
use crate::runner::{ConcatRunner, MuxerConfig};
use crate::scanner::{self, ScanOptions};

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

const PREVIEW_COUNT: usize = 5;

#[derive(Debug, Clone)]
pub struct StitchConfig {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub dest: Option<PathBuf>,
    pub dest_policy: DestPolicy,
    pub scan: ScanOptions,
    pub muxer: MuxerConfig,
    pub manifest_dir: PathBuf,
}

/// One full run: resolve output, scan, order, size, write manifest, mux.
///
/// A muxer that exits non-zero still yields `Ok` with `success == false`.
pub fn stitch_directory(
    config: &StitchConfig,
    progress: &ProgressHandle,
    cancel: &AtomicBool,
) -> Result<RunReport, StitchError> {
    if !config.source.is_dir() {
        return Err(StitchError::DirectoryNotFound(config.source.clone()));
    }
    let source_root = std::path::absolute(&config.source)?;

    // Before scanning, so a bad destination fails fast.
    progress.set_stage("resolve output");
    let resolved = resolve_output_path(
        config.output.as_deref(),
        config.dest.as_deref(),
        &source_root,
    )?;
    for w in &resolved.warnings {
        progress.warn(w);
    }
    let target = resolved.prepare(config.dest_policy)?;
    if target.parent_created {
        if let Some(parent) = target.path.parent() {
            progress.log(format!("Created destination folder: {}", parent.display()));
        }
    }

    progress.set_stage("scan");
    progress.log(format!("Scanning directory: {}", source_root.display()));
    let scan = scanner::scan_segments(&source_root, config.scan)?;
    if scan.dcim_detected {
        progress.log(format!(
            "Detected DCIM structure, processing {}",
            scan.scan_root.display()
        ));
    }
    for w in &scan.warnings {
        progress.warn(w);
    }

    let mut segments = scan.segments;
    let before = segments.len();
    segments.retain(|s| s.path != target.path);
    if segments.len() != before {
        progress.warn(&RunWarning::OutputExcluded(target.path.clone()));
    }
    if segments.is_empty() {
        return Err(StitchError::NoSegmentsFound(scan.scan_root));
    }

    let segments = scanner::order_segments(segments);
    let (driving_count, parking_count) = scanner::provenance_counts(&segments);
    progress.log(format!(
        "Found {} video files ({} driving, {} parking), first in order:",
        segments.len(),
        driving_count,
        parking_count
    ));
    for (i, seg) in segments.iter().take(PREVIEW_COUNT).enumerate() {
        progress.log(format!(
            "  {}. [{}] {}",
            i + 1,
            seg.provenance.label(),
            seg.file_name
        ));
    }
    if segments.len() > PREVIEW_COUNT {
        progress.log(format!("  ... and {} more", segments.len() - PREVIEW_COUNT));
    }

    let sizes = scanner::accumulate_sizes(&segments);
    for w in &sizes.warnings {
        progress.warn(w);
    }
    progress.log(format!("Total size: {:.1} MB", sizes.total_mb()));

    progress.set_stage("write manifest");
    let manifest = ConcatManifest::write(&segments, &config.manifest_dir)?;

    progress.set_stage("mux");
    progress.log(format!("Stitching videos into: {}", target.path.display()));
    progress.start_muxing(manifest.len());
    let mut runner = ConcatRunner::new(config.muxer.clone());
    let outcome = runner.run(&segments, manifest, &target.path, progress, cancel);
    progress.stop_muxing();
    let outcome = outcome?;

    Ok(RunReport {
        source_root,
        output: target.path,
        segment_count: segments.len(),
        opened_count: outcome.opened,
        driving_count,
        parking_count,
        total_bytes: sizes.total_bytes,
        total_mb: sizes.total_mb(),
        elapsed_secs: outcome.elapsed.as_secs_f64(),
        success: outcome.success,
        exit_code: outcome.exit_code,
        warnings: progress.warnings(),
        diagnostics: outcome.diagnostics,
    })
}
