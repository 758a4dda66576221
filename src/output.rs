//! Destinations for PDF and PostScript output.
//!
//! A destination is written as a short string, as in the print dialogs of old:
//!
//! * `|command` pipes the output into `command`, run through `sh -c`;
//! * `>path` writes the output into a file;
//! * anything else sends the output to the printer of that name with `lpr`, or to
//!   the default printer if the string is empty.

use std::cell::RefCell;
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::rc::Rc;
use std::str::FromStr;

use chrono::prelude::*;

use crate::error::RenderingError;

/// A parsed output destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    Pipe(String),
    File(PathBuf),
    Printer(Option<String>),
}

impl OutputSpec {
    pub fn parse(spec: &str) -> OutputSpec {
        if let Some(command) = spec.strip_prefix('|') {
            OutputSpec::Pipe(command.trim_start().to_string())
        } else if let Some(path) = spec.strip_prefix('>') {
            OutputSpec::File(PathBuf::from(path.trim_start()))
        } else if spec.is_empty() {
            OutputSpec::Printer(None)
        } else {
            OutputSpec::Printer(Some(spec.to_string()))
        }
    }

    fn command(&self) -> Option<Command> {
        match self {
            OutputSpec::Pipe(command) => {
                let mut c = Command::new("sh");
                c.arg("-c").arg(command);
                Some(c)
            }

            OutputSpec::Printer(printer) => {
                let mut c = Command::new("lpr");
                if let Some(name) = printer {
                    c.arg("-P").arg(name);
                }
                Some(c)
            }

            OutputSpec::File(_) => None,
        }
    }
}

impl FromStr for OutputSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<OutputSpec, Self::Err> {
        Ok(OutputSpec::parse(s))
    }
}

/// An in-memory destination whose contents can be read after rendering.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer(Rc<RefCell<Vec<u8>>>);

impl MemoryBuffer {
    pub fn new() -> MemoryBuffer {
        Default::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// The byte stream that a PDF or PostScript surface writes into.
pub enum OutputStream {
    File(BufWriter<File>),

    Process {
        child: Child,
        stdin: Option<ChildStdin>,
        description: String,
    },

    Memory(MemoryBuffer),

    /// Any other writer.
    Writer(Box<dyn Write>),
}

impl OutputStream {
    /// Opens the destination described by `spec`.
    pub fn open(spec: &OutputSpec) -> Result<OutputStream, RenderingError> {
        match spec {
            OutputSpec::File(path) => {
                let file = File::create(path)
                    .map_err(|e| RenderingError::Output(format!("{}: {}", path.display(), e)))?;
                Ok(OutputStream::File(BufWriter::new(file)))
            }

            _ => {
                let description = match spec {
                    OutputSpec::Pipe(command) => command.clone(),
                    OutputSpec::Printer(Some(name)) => format!("lpr -P {name}"),
                    _ => String::from("lpr"),
                };

                // File was handled above
                let mut command = match spec.command() {
                    Some(c) => c,
                    None => return Err(RenderingError::Output(description)),
                };

                let mut child = command
                    .stdin(Stdio::piped())
                    .spawn()
                    .map_err(|e| RenderingError::Output(format!("{description}: {e}")))?;

                let stdin = child.stdin.take();

                Ok(OutputStream::Process {
                    child,
                    stdin,
                    description,
                })
            }
        }
    }

    /// Creates a stream that collects the output in memory.
    pub fn memory() -> (OutputStream, MemoryBuffer) {
        let buffer = MemoryBuffer::new();
        (OutputStream::Memory(buffer.clone()), buffer)
    }

    /// Flushes the stream and, for processes, waits for them to exit.
    pub fn close(self) -> Result<(), RenderingError> {
        match self {
            OutputStream::File(mut f) => f.flush()?,

            OutputStream::Process {
                mut child,
                stdin,
                description,
            } => {
                if let Some(mut stdin) = stdin {
                    stdin.flush()?;
                }

                let status = child.wait()?;
                if !status.success() {
                    return Err(RenderingError::Output(format!(
                        "{description} exited with {status}"
                    )));
                }
            }

            OutputStream::Memory(_) => (),

            OutputStream::Writer(mut w) => w.flush()?,
        }

        Ok(())
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::File(f) => f.write(buf),

            OutputStream::Process { stdin, .. } => match stdin {
                Some(s) => s.write(buf),
                None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed")),
            },

            OutputStream::Memory(m) => m.0.borrow_mut().write(buf),

            OutputStream::Writer(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::File(f) => f.flush(),
            OutputStream::Process { stdin, .. } => match stdin {
                Some(s) => s.flush(),
                None => Ok(()),
            },
            OutputStream::Memory(_) => Ok(()),
            OutputStream::Writer(w) => w.flush(),
        }
    }
}

/// Creation date for reproducible builds, from `SOURCE_DATE_EPOCH`.
///
/// Returns `Ok(None)` if the variable is not set.
pub fn creation_date() -> Result<Option<String>, RenderingError> {
    match env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) => {
            let seconds = i64::from_str(&epoch).map_err(|e| {
                RenderingError::Output(format!("Environment variable $SOURCE_DATE_EPOCH: {e}"))
            })?;

            let datetime = Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
                RenderingError::Output(format!(
                    "Environment variable $SOURCE_DATE_EPOCH: {seconds} is out of range"
                ))
            })?;

            Ok(Some(datetime.to_rfc3339()))
        }

        Err(env::VarError::NotPresent) => Ok(None),

        Err(env::VarError::NotUnicode(_)) => Err(RenderingError::Output(String::from(
            "Environment variable $SOURCE_DATE_EPOCH is not valid Unicode",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_specs() {
        assert_eq!(
            OutputSpec::parse("|  gzip > out.gz"),
            OutputSpec::Pipe("gzip > out.gz".to_string())
        );
        assert_eq!(
            OutputSpec::parse("> /tmp/out.pdf"),
            OutputSpec::File(PathBuf::from("/tmp/out.pdf"))
        );
        assert_eq!(
            OutputSpec::parse("office"),
            OutputSpec::Printer(Some("office".to_string()))
        );
        assert_eq!(OutputSpec::parse(""), OutputSpec::Printer(None));
    }

    #[test]
    fn memory_stream_collects_bytes() {
        let (mut stream, buffer) = OutputStream::memory();
        stream.write_all(b"%PDF").unwrap();
        stream.close().unwrap();
        assert_eq!(buffer.contents(), b"%PDF");
    }

    #[test]
    fn file_stream_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ps");

        let mut stream = OutputStream::open(&OutputSpec::File(path.clone())).unwrap();
        stream.write_all(b"%!PS").unwrap();
        stream.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"%!PS");
    }

    #[test]
    fn unwritable_file_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pdf");

        assert!(matches!(
            OutputStream::open(&OutputSpec::File(path)),
            Err(RenderingError::Output(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn pipe_stream_feeds_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piped.txt");

        let spec = OutputSpec::parse(&format!("|cat > '{}'", path.display()));
        let mut stream = OutputStream::open(&spec).unwrap();
        stream.write_all(b"hello").unwrap();
        stream.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_reported() {
        let stream = OutputStream::open(&OutputSpec::Pipe("exit 3".to_string())).unwrap();
        assert!(matches!(stream.close(), Err(RenderingError::Output(_))));
    }
}
