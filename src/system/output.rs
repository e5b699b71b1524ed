// src/system/output.rs

use colored::{Color, Colorize};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::{Arc, Mutex};

type SharedSink = Arc<Mutex<Box<dyn Write + Send>>>;

const PREFIX_COLORS: &[Color] = &[
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::Blue,
    Color::BrightCyan,
    Color::BrightGreen,
];

/// Serializes host output onto one sink, a whole line at a time.
#[derive(Clone)]
pub struct OutputMux {
    sink: SharedSink,
    prefixes: bool,
    colors: bool,
    width: usize,
}

impl fmt::Debug for OutputMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputMux")
            .field("prefixes", &self.prefixes)
            .field("colors", &self.colors)
            .field("width", &self.width)
            .finish()
    }
}

impl OutputMux {
    /// Writes to the process stdout; colors follow `colored`'s terminal detection.
    pub fn stdout(prefixes: bool) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(io::stdout()))),
            prefixes,
            colors: colored::control::SHOULD_COLORIZE.should_colorize(),
            width: 0,
        }
    }

    /// Writes into an in-memory buffer, without colors. Returns the buffer too.
    pub fn capture(prefixes: bool) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let mux = Self {
            sink: Arc::new(Mutex::new(Box::new(SharedBuffer(buffer.clone())))),
            prefixes,
            colors: false,
            width: 0,
        };
        (mux, buffer)
    }

    /// Pads every prefix to the longest of `names`.
    pub fn align_to<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.width = names.into_iter().map(str::len).max().unwrap_or(0);
        self
    }

    pub fn writer_for(&self, host_name: &str, index: usize) -> HostWriter {
        let prefix = if self.prefixes {
            let padded = format!("{:<width$} | ", host_name, width = self.width);
            if self.colors {
                let color = PREFIX_COLORS
                    .get(index % PREFIX_COLORS.len())
                    .copied()
                    .unwrap_or(Color::White);
                padded.color(color).to_string()
            } else {
                padded
            }
        } else {
            String::new()
        };
        HostWriter {
            prefix,
            sink: self.sink.clone(),
        }
    }
}

/// A per-host handle on the shared sink.
pub struct HostWriter {
    prefix: String,
    sink: SharedSink,
}

impl fmt::Debug for HostWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostWriter").field("prefix", &self.prefix).finish()
    }
}

impl HostWriter {
    /// Writes one prefixed line as received. A final line without a newline
    /// is forwarded without one.
    pub fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut rendered = Vec::with_capacity(self.prefix.len() + line.len());
        rendered.extend_from_slice(self.prefix.as_bytes());
        rendered.extend_from_slice(line);
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| io::Error::other("output sink poisoned"))?;
        sink.write_all(&rendered)?;
        sink.flush()
    }

    /// Forwards `reader` line by line until end of file.
    pub fn copy_lines(&self, reader: impl Read) -> io::Result<()> {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            self.write_line(&line)?;
        }
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
