use crate::error::RunWarning;
use crate::runner::{EventSink, RunEvent};
use crate::util::format_duration;

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedProgressMode {
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    pub idle_threshold: Duration,
    tty_override: Option<bool>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mode: ProgressMode::Auto,
            idle_threshold: Duration::from_secs(30),
            tty_override: None,
        }
    }
}

impl ProgressConfig {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_tty_override(mut self, is_tty: bool) -> Self {
        self.tty_override = Some(is_tty);
        self
    }

    pub fn resolve_mode(self) -> ResolvedProgressMode {
        self.mode.resolve(
            self.tty_override
                .unwrap_or_else(|| std::io::stderr().is_terminal()),
        )
    }
}

impl ProgressMode {
    fn resolve(self, stderr_is_tty: bool) -> ResolvedProgressMode {
        match self {
            ProgressMode::Auto => {
                if stderr_is_tty {
                    ResolvedProgressMode::Rich
                } else {
                    ResolvedProgressMode::Plain
                }
            }
            ProgressMode::Rich => ResolvedProgressMode::Rich,
            ProgressMode::Plain => ResolvedProgressMode::Plain,
            ProgressMode::Quiet => ResolvedProgressMode::Quiet,
        }
    }
}

/// End-of-run aggregate. Not persisted unless `--report-json` asks for it.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source_root: PathBuf,
    pub output: PathBuf,
    pub segment_count: usize,
    pub opened_count: usize,
    pub driving_count: usize,
    pub parking_count: usize,
    pub total_bytes: u64,
    pub total_mb: f64,
    pub elapsed_secs: f64,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub diagnostics: Vec<String>,
}

#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

pub struct ProgressReporter {
    handle: ProgressHandle,
    ticker: Option<JoinHandle<()>>,
}

struct ProgressInner {
    label: String,
    mode: ResolvedProgressMode,
    idle_threshold: Duration,
    state: Mutex<ProgressState>,
    rich: Option<ProgressBar>,
    stop: AtomicBool,
    finalized: AtomicBool,
}

#[derive(Debug)]
struct ProgressState {
    stage: String,
    total_segments: usize,
    opened: usize,
    muxing: bool,
    last_progress: Instant,
    last_idle_warn: Option<Instant>,
    warnings: Vec<String>,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, config: ProgressConfig) -> Self {
        let label = label.into();
        let mode = config.resolve_mode();
        let now = Instant::now();

        let rich = if mode == ResolvedProgressMode::Rich {
            Some(new_rich_bar(&label))
        } else {
            None
        };

        let inner = Arc::new(ProgressInner {
            label,
            mode,
            idle_threshold: config.idle_threshold,
            state: Mutex::new(ProgressState {
                stage: "initializing".to_string(),
                total_segments: 0,
                opened: 0,
                muxing: false,
                last_progress: now,
                last_idle_warn: None,
                warnings: Vec::new(),
            }),
            rich,
            stop: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        });

        let ticker_inner = Arc::clone(&inner);
        let ticker = thread::spawn(move || {
            while !ticker_inner.stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(250));
                ticker_inner.tick_once();
            }
        });

        Self {
            handle: ProgressHandle { inner },
            ticker: Some(ticker),
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    pub fn finish(mut self, final_message: impl Into<String>) {
        self.shutdown_ticker();
        self.handle.inner.finalize(Some(final_message.into()));
    }

    fn shutdown_ticker(&mut self) {
        self.handle.inner.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.ticker.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown_ticker();
        self.handle.inner.finalize(None);
    }
}

impl ProgressHandle {
    pub fn set_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        if let Some(bar) = &self.inner.rich {
            bar.set_message(stage.clone());
        }
        self.inner.state.lock().unwrap().stage = stage;
    }

    /// Switch the display to per-segment counting for the muxer phase.
    pub fn start_muxing(&self, total_segments: usize) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.total_segments = total_segments;
            state.opened = 0;
            state.muxing = true;
            state.last_progress = Instant::now();
            state.last_idle_warn = None;
        }
        if let Some(bar) = &self.inner.rich {
            bar.set_length(total_segments.max(1) as u64);
            bar.set_position(0);
        }
    }

    pub fn stop_muxing(&self) {
        self.inner.state.lock().unwrap().muxing = false;
    }

    pub fn log(&self, message: impl Into<String>) {
        self.inner.emit_message("INFO", &message.into());
    }

    /// Recorded for the final summary, not printed immediately.
    pub fn warn(&self, warning: &RunWarning) {
        let mut state = self.inner.state.lock().unwrap();
        state.warnings.push(warning.to_string());
    }

    pub fn warnings(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().warnings.clone()
    }
}

impl EventSink for ProgressHandle {
    fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::SegmentOpened {
                index,
                total,
                provenance,
                file_name,
            } => {
                {
                    let mut state = self.inner.state.lock().unwrap();
                    state.opened = state.opened.max(*index);
                    state.last_progress = Instant::now();
                }
                let line = format!(
                    "[{}/{}] Processing [{}]: {}",
                    index,
                    total,
                    provenance.label(),
                    file_name
                );
                match self.inner.mode {
                    ResolvedProgressMode::Quiet => {}
                    ResolvedProgressMode::Plain => eprintln!("{}", line),
                    ResolvedProgressMode::Rich => {
                        if let Some(bar) = &self.inner.rich {
                            bar.set_position(*index as u64);
                            bar.set_message(file_name.clone());
                            bar.println(line);
                        }
                    }
                }
            }
            RunEvent::MuxerDiagnostic(line) => self.inner.print_line(&format!("[MUXER] {}", line)),
            RunEvent::Warning(warning) => self.warn(warning),
        }
    }
}

impl ProgressInner {
    fn tick_once(&self) {
        let idle_warning = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            if !state.muxing
                || !idle_warning_due(
                    now,
                    state.last_progress,
                    state.last_idle_warn,
                    self.idle_threshold,
                )
            {
                return;
            }
            state.last_idle_warn = Some(now);
            let msg = format!(
                "IDLE WARNING: no new segment opened for {}s (stage={}, opened={}/{})",
                now.duration_since(state.last_progress).as_secs(),
                state.stage,
                state.opened,
                state.total_segments
            );
            state.warnings.push(msg.clone());
            msg
        };
        self.emit_message("WARN", &idle_warning);
    }

    fn emit_message(&self, level: &str, message: &str) {
        self.print_line(&format!("[{}] {}: {}", level, self.label, message));
    }

    fn print_line(&self, line: &str) {
        match self.mode {
            ResolvedProgressMode::Quiet => {}
            ResolvedProgressMode::Plain => eprintln!("{}", line),
            ResolvedProgressMode::Rich => match &self.rich {
                Some(bar) => bar.println(line),
                None => eprintln!("{}", line),
            },
        }
    }

    fn finalize(&self, final_message: Option<String>) {
        if !self.finalized.swap(true, Ordering::Relaxed) {
            match self.mode {
                ResolvedProgressMode::Quiet => {}
                ResolvedProgressMode::Plain => {
                    if let Some(msg) = final_message.as_deref() {
                        eprintln!("[DONE] {}: {}", self.label, msg);
                    }
                }
                ResolvedProgressMode::Rich => {
                    if let Some(bar) = &self.rich {
                        match final_message {
                            Some(msg) => bar.finish_with_message(msg),
                            None => bar.finish_and_clear(),
                        }
                    }
                }
            }
        }
    }
}

fn new_rich_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new(1);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} | {msg}",
        )
        .expect("valid progress template"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message(format!("{} starting", label));
    bar
}

pub fn summary_line(report: &RunReport) -> String {
    format!(
        "Stitch summary: source={} output={} segments={} driving={} parking={} size={:.1}MB duration={} status={} warnings={}",
        report.source_root.display(),
        report.output.display(),
        report.segment_count,
        report.driving_count,
        report.parking_count,
        report.total_mb,
        format_duration(Duration::from_secs_f64(report.elapsed_secs.max(0.0))),
        if report.success { "ok" } else { "failed" },
        report.warnings.len(),
    )
}

fn idle_warning_due(
    now: Instant,
    last_progress: Instant,
    last_idle_warn: Option<Instant>,
    idle_threshold: Duration,
) -> bool {
    if now.duration_since(last_progress) < idle_threshold {
        return false;
    }
    match last_idle_warn {
        Some(last_warn) => now.duration_since(last_warn) >= idle_threshold,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Provenance;

    #[test]
    fn mode_resolution_respects_tty_override() {
        let cfg_tty = ProgressConfig::new(ProgressMode::Auto).with_tty_override(true);
        assert_eq!(cfg_tty.resolve_mode(), ResolvedProgressMode::Rich);

        let cfg_not_tty = ProgressConfig::new(ProgressMode::Auto).with_tty_override(false);
        assert_eq!(cfg_not_tty.resolve_mode(), ResolvedProgressMode::Plain);

        let cfg_quiet = ProgressConfig::new(ProgressMode::Quiet).with_tty_override(true);
        assert_eq!(cfg_quiet.resolve_mode(), ResolvedProgressMode::Quiet);
    }

    #[test]
    fn idle_warning_triggers_at_boundary() {
        let now = Instant::now();
        let threshold = Duration::from_secs(30);
        assert!(idle_warning_due(now + threshold, now, None, threshold));
        assert!(!idle_warning_due(now + Duration::from_secs(29), now, None, threshold));

        // If warning already emitted recently, no duplicate yet.
        assert!(!idle_warning_due(
            now + threshold,
            now,
            Some(now + Duration::from_secs(10)),
            threshold
        ));
    }

    #[test]
    fn opened_segments_and_warnings_are_recorded() {
        let reporter = ProgressReporter::new("stitch", ProgressConfig::new(ProgressMode::Quiet));
        let handle = reporter.handle();
        handle.start_muxing(2);
        handle.on_event(&RunEvent::SegmentOpened {
            index: 1,
            total: 2,
            provenance: Provenance::Parking,
            file_name: "a.mp4".to_string(),
        });
        handle.on_event(&RunEvent::MuxerDiagnostic("Warning: x".to_string()));
        handle.warn(&RunWarning::DestinationIgnored(PathBuf::from("/out")));
        assert_eq!(handle.inner.state.lock().unwrap().opened, 1);
        handle.stop_muxing();

        reporter.finish("done");
        let warnings = handle.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("/out"));
    }

    #[test]
    fn summary_line_reports_status_and_counts() {
        let report = RunReport {
            source_root: PathBuf::from("/src"),
            output: PathBuf::from("/src/stitched_output.mp4"),
            segment_count: 3,
            opened_count: 3,
            driving_count: 2,
            parking_count: 1,
            total_bytes: 3 * 1024 * 1024,
            total_mb: 3.0,
            elapsed_secs: 5.0,
            success: true,
            exit_code: Some(0),
            warnings: vec![],
            diagnostics: vec![],
        };
        let line = summary_line(&report);
        assert!(line.contains("segments=3 driving=2 parking=1"));
        assert!(line.contains("size=3.0MB"));
        assert!(line.contains("status=ok"));
    }
}
