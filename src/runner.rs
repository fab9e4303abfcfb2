//! Drives one external muxer process over a concat manifest.
//!
//! Lifecycle: `Idle -> ManifestReady -> Running -> {Succeeded | Failed} -> Cleaned`.
//! The manifest is deleted on every path out of [`ConcatRunner::run`],
//! including spawn failures and cancellation.
//!
//! The muxer's stderr is drained on a dedicated thread while the process
//! runs. Each line is classified there and forwarded over a bounded channel;
//! the calling thread renders events and watches the cancel flag.

use crate::error::{RunWarning, StitchError};
use crate::manifest::ConcatManifest;
use crate::scanner::{Provenance, Segment};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const EVENT_QUEUE_DEPTH: usize = 256;
/// Debug-level chatter (roughly one line per packet) only keeps its tail.
const CHATTER_TAIL: usize = 20;
/// Ceiling for `[info]` and louder lines; past it they share the chatter tail.
const KEPT_LINE_LIMIT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ManifestReady,
    Running,
    Succeeded,
    Failed,
    Cleaned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    SegmentOpened {
        index: usize,
        total: usize,
        provenance: Provenance,
        file_name: String,
    },
    /// A muxer line carrying a warning or error marker, verbatim.
    MuxerDiagnostic(String),
    Warning(RunWarning),
}

pub trait EventSink {
    fn on_event(&self, event: &RunEvent);
}

#[derive(Debug, Clone)]
pub struct MuxerConfig {
    pub program: PathBuf,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct MuxOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub opened: usize,
    pub elapsed: Duration,
    pub diagnostics: Vec<String>,
}

/// Concat demuxer in, stream copy out. `+genpts` is an input flag, so it
/// precedes `-i`. Per-input "Opening" lines are only logged at debug level;
/// `level` tags every line so warnings and errors can be told apart.
pub fn muxer_args(manifest: &Path, output: &Path, overwrite: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-nostdin",
        "-nostats",
        "-loglevel",
        "repeat+level+debug",
        "-fflags",
        "+genpts",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(manifest.as_os_str().to_os_string());
    for arg in ["-c", "copy", "-movflags", "+faststart"] {
        args.push(arg.into());
    }
    args.push(if overwrite { "-y" } else { "-n" }.into());
    args.push(output.as_os_str().to_os_string());
    args
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Opening,
    Diagnostic,
}

struct LinePattern {
    kind: LineKind,
    needle: &'static str,
}

// First match wins. Diagnostics are recognized by ffmpeg's level tags.
const LINE_PATTERNS: &[LinePattern] = &[
    LinePattern {
        kind: LineKind::Opening,
        needle: "Opening '",
    },
    LinePattern {
        kind: LineKind::Diagnostic,
        needle: "[warning]",
    },
    LinePattern {
        kind: LineKind::Diagnostic,
        needle: "[error]",
    },
    LinePattern {
        kind: LineKind::Diagnostic,
        needle: "[fatal]",
    },
    LinePattern {
        kind: LineKind::Diagnostic,
        needle: "[panic]",
    },
];

fn line_kind(line: &str) -> Option<LineKind> {
    LINE_PATTERNS
        .iter()
        .find(|p| line.contains(p.needle))
        .map(|p| p.kind)
}

/// Maps muxer "Opening" lines back to known segments so provenance comes
/// from the scan, never from the log text.
pub struct LineClassifier {
    by_path: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
    segments: Vec<(String, Provenance)>,
    consumed: Vec<bool>,
    opened: usize,
}

impl LineClassifier {
    pub fn new(segments: &[Segment]) -> Self {
        let mut by_path = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, seg) in segments.iter().enumerate() {
            by_path
                .entry(normalize(&seg.path.to_string_lossy()))
                .or_insert(idx);
            by_name.entry(seg.file_name.clone()).or_default().push(idx);
        }
        Self {
            by_path,
            by_name,
            segments: segments
                .iter()
                .map(|s| (s.file_name.clone(), s.provenance))
                .collect(),
            consumed: vec![false; segments.len()],
            opened: 0,
        }
    }

    pub fn opened(&self) -> usize {
        self.opened
    }

    pub fn classify(&mut self, line: &str) -> Option<RunEvent> {
        match line_kind(line)? {
            LineKind::Opening => {
                if line.trim_end().ends_with("for writing") {
                    return None;
                }
                let idx = self.match_segment(opened_path(line)?)?;
                self.consumed[idx] = true;
                self.opened += 1;
                let (file_name, provenance) = self.segments[idx].clone();
                Some(RunEvent::SegmentOpened {
                    index: self.opened,
                    total: self.segments.len(),
                    provenance,
                    file_name,
                })
            }
            LineKind::Diagnostic => Some(RunEvent::MuxerDiagnostic(line.to_string())),
        }
    }

    fn match_segment(&self, opened: &str) -> Option<usize> {
        let opened = normalize(opened.strip_prefix("file:").unwrap_or(opened));
        if let Some(&idx) = self.by_path.get(&opened) {
            if !self.consumed[idx] {
                return Some(idx);
            }
        }
        let name = opened.rsplit('/').next().unwrap_or(opened.as_str());
        self.by_name
            .get(name)?
            .iter()
            .copied()
            .find(|&idx| !self.consumed[idx])
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

// Paths may contain quotes, so take everything up to the last one.
fn opened_path(line: &str) -> Option<&str> {
    let start = line.find("Opening '")? + "Opening '".len();
    let rest = &line[start..];
    let end = rest.rfind('\'')?;
    Some(&rest[..end])
}

#[derive(Debug, Default)]
struct ReaderOutcome {
    lines: Vec<String>,
    opened: usize,
}

fn is_chatter(line: &str) -> bool {
    ["[verbose]", "[debug]", "[trace]"]
        .iter()
        .any(|tag| line.contains(tag))
}

/// Captured muxer stderr. Every `[info]` and louder line is kept, up to
/// `KEPT_LINE_LIMIT`; everything else only keeps its last `CHATTER_TAIL` lines.
#[derive(Debug, Default)]
struct DiagnosticLog {
    seq: u64,
    kept: Vec<(u64, String)>,
    tail: VecDeque<(u64, String)>,
    omitted: usize,
}

impl DiagnosticLog {
    fn push(&mut self, line: &str) {
        self.seq += 1;
        let entry = (self.seq, line.to_string());
        if !is_chatter(line) && self.kept.len() < KEPT_LINE_LIMIT {
            self.kept.push(entry);
            return;
        }
        self.tail.push_back(entry);
        if self.tail.len() > CHATTER_TAIL {
            self.tail.pop_front();
            self.omitted += 1;
        }
    }

    #[cfg(test)]
    fn retained(&self) -> usize {
        self.kept.len() + self.tail.len()
    }

    fn into_lines(self) -> Vec<String> {
        let DiagnosticLog {
            kept,
            tail,
            omitted,
            ..
        } = self;
        let mut entries = kept;
        entries.extend(tail);
        entries.sort_by_key(|(seq, _)| *seq);

        let mut lines = Vec::with_capacity(entries.len() + 1);
        if omitted > 0 {
            lines.push(format!("... {} earlier muxer lines omitted", omitted));
        }
        lines.extend(entries.into_iter().map(|(_, line)| line));
        lines
    }
}

fn spawn_line_reader(
    stderr: impl Read + Send + 'static,
    mut classifier: LineClassifier,
    tx: Sender<RunEvent>,
) -> JoinHandle<ReaderOutcome> {
    std::thread::spawn(move || {
        let mut log = DiagnosticLog::default();
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).unwrap_or(0);
            if read == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&buf);
            for piece in text.split('\r') {
                let cleaned = piece.trim_end();
                if cleaned.trim().is_empty() {
                    continue;
                }
                if let Some(event) = classifier.classify(cleaned) {
                    // Receiver only goes away once the run is over.
                    let _ = tx.send(event);
                }
                log.push(cleaned);
            }
        }

        ReaderOutcome {
            lines: log.into_lines(),
            opened: classifier.opened(),
        }
    })
}

pub struct ConcatRunner {
    config: MuxerConfig,
    state: RunState,
    poll_interval: Duration,
}

impl ConcatRunner {
    pub fn new(config: MuxerConfig) -> Self {
        Self {
            config,
            state: RunState::Idle,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the muxer to completion. A non-zero exit is reported through
    /// `MuxOutcome::success`; only launch failures and cancellation are errors.
    pub fn run(
        &mut self,
        segments: &[Segment],
        manifest: ConcatManifest,
        output: &Path,
        sink: &dyn EventSink,
        cancel: &AtomicBool,
    ) -> Result<MuxOutcome, StitchError> {
        self.state = RunState::ManifestReady;

        let spawned = Command::new(&self.config.program)
            .args(muxer_args(manifest.path(), output, self.config.overwrite))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.cleanup(manifest, sink);
                return Err(StitchError::MuxerNotFound {
                    program: self.config.program.clone(),
                    reason: e.to_string(),
                });
            }
        };
        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            let _ = child.wait();
            self.cleanup(manifest, sink);
            return Err(StitchError::Io(std::io::Error::other(
                "muxer stderr was not captured",
            )));
        };

        self.state = RunState::Running;
        let started = Instant::now();
        let (tx, rx) = bounded::<RunEvent>(EVENT_QUEUE_DEPTH);
        let reader = spawn_line_reader(stderr, LineClassifier::new(segments), tx);

        let mut cancelled = false;
        loop {
            if !cancelled && cancel.load(Ordering::Relaxed) {
                cancelled = true;
                let _ = child.kill();
            }
            match rx.recv_timeout(self.poll_interval) {
                Ok(event) => sink.on_event(&event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let waited = child.wait();
        let read = reader.join().unwrap_or_default();
        let elapsed = started.elapsed();

        let success = matches!(&waited, Ok(status) if status.success()) && !cancelled;
        self.state = if success {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        self.cleanup(manifest, sink);

        let status = waited?;
        if cancelled {
            return Err(StitchError::Cancelled);
        }
        Ok(MuxOutcome {
            success,
            exit_code: status.code(),
            opened: read.opened,
            elapsed,
            diagnostics: read.lines,
        })
    }

    fn cleanup(&mut self, manifest: ConcatManifest, sink: &dyn EventSink) {
        if let Err(warning) = manifest.cleanup() {
            sink.on_event(&RunEvent::Warning(warning));
        }
        self.state = RunState::Cleaned;
    }
}
