//! Stream capture for fragment output.
//!
//! Everything a fragment writes (Rhai `print`/`debug`, `eprint`, child
//! processes started with `shell`) goes through one [`OutputSink`]. The sink
//! forwards to the process streams unless a [`CaptureGuard`] is alive, in
//! which case bytes land in per-stream buffers. Dropping the guard puts the
//! previous target back, on every exit path.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Default)]
struct Targets {
    stdout: Option<Vec<u8>>,
    stderr: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    targets: Arc<Mutex<Targets>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Targets> {
        // A panic while holding the lock leaves plain byte buffers behind.
        self.targets.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn write(&self, stream: Stream, bytes: &[u8]) {
        let mut targets = self.lock();
        let slot = match stream {
            Stream::Stdout => &mut targets.stdout,
            Stream::Stderr => &mut targets.stderr,
        };
        if let Some(buf) = slot.as_mut() {
            buf.extend_from_slice(bytes);
            return;
        }
        drop(targets);
        let written = match stream {
            Stream::Stdout => io::stdout().write_all(bytes),
            Stream::Stderr => io::stderr().write_all(bytes),
        };
        if let Err(e) = written {
            tracing::trace!(error = %e, ?stream, "passthrough write failed");
        }
    }

    pub fn write_line(&self, stream: Stream, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.write(stream, line.as_bytes());
    }

    pub fn is_capturing(&self) -> bool {
        let targets = self.lock();
        targets.stdout.is_some() || targets.stderr.is_some()
    }

    /// Start capturing both streams until the returned guard is dropped.
    pub fn capture(&self) -> CaptureGuard {
        let previous = {
            let mut targets = self.lock();
            std::mem::replace(
                &mut *targets,
                Targets { stdout: Some(Vec::new()), stderr: Some(Vec::new()) },
            )
        };
        CaptureGuard { sink: self.clone(), previous: Some(previous) }
    }
}

/// Bytes captured while a guard was alive.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[must_use = "dropping the guard ends the capture"]
pub struct CaptureGuard {
    sink: OutputSink,
    previous: Option<Targets>,
}

impl CaptureGuard {
    /// End the capture and hand back what was written.
    pub fn finish(mut self) -> Captured {
        self.restore()
    }

    fn restore(&mut self) -> Captured {
        let Some(previous) = self.previous.take() else {
            return Captured::default();
        };
        let mut targets = self.sink.lock();
        let current = std::mem::replace(&mut *targets, previous);
        Captured {
            stdout: current.stdout.unwrap_or_default(),
            stderr: current.stderr.unwrap_or_default(),
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.restore();
    }
}
