//! The host boundary: logging sinks and file access.
//!
//! No `log`/`tracing` dependency — `PlatformContext` is the only diagnostic
//! channel, matching spec.md §6's embedding API and grounded in the
//! `PrintWriter`/`StdPrint`/`CollectStringPrint` trait-plus-sink pattern from
//! `examples/parcadei-ouros/crates/ouros/src/io.rs`.

use std::fs::File;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

pub trait FileHandle {
    fn read_line(&mut self) -> io::Result<Option<String>>;
    fn write_line(&mut self, line: &str) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

/// The host-supplied sink for diagnostics and file access. `log_echo` is
/// split from `log_warning`/`log_error` because spec.md §7 lists `echo(...)`
/// output as a distinct user-visible channel (see SPEC_FULL.md §4.10).
pub trait PlatformContext {
    fn log_echo(&mut self, message: &str);
    fn log_warning(&mut self, message: &str);
    fn log_error(&mut self, message: &str);
    fn open_file(&mut self, path: &str, mode: FileMode) -> io::Result<Box<dyn FileHandle>>;
}

/// Swallows every diagnostic and refuses file access; useful as a minimal
/// default or in tests that don't care about the platform surface.
#[derive(Debug, Default)]
pub struct NullPlatformContext;

impl PlatformContext for NullPlatformContext {
    fn log_echo(&mut self, _message: &str) {}
    fn log_warning(&mut self, _message: &str) {}
    fn log_error(&mut self, _message: &str) {}
    fn open_file(&mut self, _path: &str, _mode: FileMode) -> io::Result<Box<dyn FileHandle>> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "no filesystem access"))
    }
}

/// Buffers each channel into a `Vec<String>`; used by tests that assert on
/// logged output.
#[derive(Debug, Default)]
pub struct CollectingPlatformContext {
    pub echo: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl PlatformContext for CollectingPlatformContext {
    fn log_echo(&mut self, message: &str) {
        self.echo.push(message.to_string());
    }
    fn log_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
    fn log_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
    fn open_file(&mut self, _path: &str, _mode: FileMode) -> io::Result<Box<dyn FileHandle>> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "no filesystem access"))
    }
}

/// Thin wrapper around `std::fs::File`, the host's usual choice.
pub struct StdFileHandle {
    file: File,
    read_buf: Option<io::BufReader<File>>,
}

impl StdFileHandle {
    /// Opens a real filesystem file. Hosts that want in-memory or virtual
    /// filesystems implement [`FileHandle`] directly instead.
    pub fn open(path: &str, mode: FileMode) -> io::Result<Self> {
        let file = match mode {
            FileMode::Read => File::open(path)?,
            FileMode::Write => File::create(path)?,
            FileMode::Append => std::fs::OpenOptions::new().create(true).append(true).open(path)?,
        };
        let read_buf = if mode == FileMode::Read {
            Some(io::BufReader::new(file.try_clone()?))
        } else {
            None
        };
        Ok(Self { file, read_buf })
    }
}

impl FileHandle for StdFileHandle {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let Some(reader) = self.read_buf.as_mut() else {
            return Ok(None);
        };
        let mut line = String::new();
        let n = io::BufRead::read_line(reader, &mut line)?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{line}")
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

