use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::trace::trace::{EngineEvent, TraceEvent};

/// JSONL sink for engine events, one object per line. The file is opened in
/// append mode; if it cannot be opened the engine runs without a trace.
pub struct TraceLogger {
    sink: Option<TraceSink>,
}

struct TraceSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl TraceLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                debug!("tracing engine events to {}", path.display());
                Self {
                    sink: Some(TraceSink {
                        path: path.to_path_buf(),
                        writer: Mutex::new(BufWriter::new(file)),
                    }),
                }
            }
            Err(e) => {
                warn!("could not open trace file {}: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path.as_path())
    }

    /// Append the events of one step and flush. Returns the lines written;
    /// a failed write drops the rest of the batch.
    pub fn record_step(&self, step: u64, events: Vec<EngineEvent>) -> usize {
        let Some(sink) = &self.sink else {
            return 0;
        };
        if events.is_empty() {
            return 0;
        }

        let mut writer = sink.writer.lock();
        let mut written = 0;
        for event in events {
            let line = match serde_json::to_string(&TraceEvent::now(step, event)) {
                Ok(line) => line,
                Err(e) => {
                    warn!("dropping trace event of step {}: {}", step, e);
                    continue;
                }
            };
            if let Err(e) = writeln!(writer, "{}", line) {
                warn!("trace write to {} failed: {}", sink.path.display(), e);
                return written;
            }
            written += 1;
        }
        if let Err(e) = writer.flush() {
            warn!("trace flush to {} failed: {}", sink.path.display(), e);
        }
        written
    }
}
