mod error;
mod manifest;
mod output;
mod progress;
mod runner;
mod scanner;
mod stitch;
#[cfg(all(test, unix))]
mod test_support;
mod util;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use error::StitchError;
use output::DestPolicy;
use progress::{ProgressConfig, ProgressMode, ProgressReporter, RunReport};
use runner::MuxerConfig;
use scanner::ScanOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "dashstitch",
    version,
    about = "Merge dashcam driving and parking segments into one file (lossless ffmpeg concat)"
)]
struct Cli {
    /// Folder with dashcam footage; a DCIM root with a Movie folder is detected
    source_directory: Option<PathBuf>,

    /// Output file name or path. Default: stitched_output.mp4
    output_file: Option<PathBuf>,

    /// Destination folder for an output given as a bare file name
    #[arg(long = "dest", value_name = "DESTINATION_DIRECTORY")]
    dest: Option<PathBuf>,

    /// Missing destination folder: create (default) or require it to exist
    #[arg(long, value_enum, default_value_t = DestPolicy::Create)]
    dest_policy: DestPolicy,

    /// ffmpeg executable used for the concat
    #[arg(long, env = "DASHSTITCH_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Where the transient concat list is written. Default: system temp dir
    #[arg(long)]
    manifest_dir: Option<PathBuf>,

    /// Replace an existing output file instead of failing
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Only scan the top level (and the Parking folder)
    #[arg(long, default_value_t = false)]
    no_recursive: bool,

    /// Do not switch into <source>/Movie when it exists
    #[arg(long, default_value_t = false)]
    no_dcim: bool,

    /// Treat footage under Parking folders as driving footage
    #[arg(long, default_value_t = false)]
    no_parking: bool,

    /// Also write the run report as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
    #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(source) = cli.source_directory.clone() else {
        println!("{}", Cli::command().render_help());
        std::process::exit(1);
    };

    util::ensure_muxer_available(&cli.ffmpeg)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let config = stitch::StitchConfig {
        source,
        output: cli.output_file.clone(),
        dest: cli.dest.clone(),
        dest_policy: cli.dest_policy,
        scan: ScanOptions {
            recursive: !cli.no_recursive,
            dcim_aware: !cli.no_dcim,
            parking_aware: !cli.no_parking,
        },
        muxer: MuxerConfig {
            program: cli.ffmpeg.clone(),
            overwrite: cli.overwrite,
        },
        manifest_dir: cli.manifest_dir.clone().unwrap_or_else(std::env::temp_dir),
    };

    let reporter = ProgressReporter::new("stitch", ProgressConfig::new(cli.progress));
    let result = stitch::stitch_directory(&config, &reporter.handle(), &cancel);
    let final_message = match &result {
        Ok(report) if report.success => "stitch complete",
        _ => "stitch failed",
    };
    reporter.finish(final_message);

    let report = result?;
    if let Some(path) = &cli.report_json {
        let json = serde_json::to_vec_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    print_run_summary(&report);
    if !report.success {
        println!("Muxer error output:");
        for line in &report.diagnostics {
            println!("  {}", line);
        }
        return Err(StitchError::MuxerNonZeroExit {
            exit_code: report.exit_code,
            opened: report.opened_count,
            total: report.segment_count,
        }
        .into());
    }
    Ok(())
}

fn print_run_summary(report: &RunReport) {
    if report.success {
        println!("Stitch: OK");
    } else {
        println!("Stitch: FAILED");
    }
    println!("{}", progress::summary_line(report));
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
}
