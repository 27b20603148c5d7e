use crate::command::{Stdin, Stdout};
use std::cell::RefCell;
use std::io::{self, Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::rc::Rc;

/// Memory-backed reader, used as the input of commands in tests and for
/// feeding piped children.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Stdin for MemReader {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(None)
    }
}

/// Memory-backed writer. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(None)
    }
}

/// The interpreter's standard input, inherited by children.
pub struct TerminalStdin;

impl Read for TerminalStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        io::stdin().lock().read(buf)
    }
}

impl Stdin for TerminalStdin {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(Some(Stdio::inherit()))
    }
}

/// The interpreter's standard output, inherited by children.
pub struct TerminalStdout;

impl Write for TerminalStdout {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        io::stdout().write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        io::stdout().flush()
    }
}

impl Stdout for TerminalStdout {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(Some(Stdio::inherit()))
    }
}

/// The interpreter's standard error, inherited by children.
pub struct TerminalStderr;

impl Write for TerminalStderr {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        io::stderr().write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        io::stderr().flush()
    }
}

impl Stdout for TerminalStderr {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(Some(Stdio::inherit()))
    }
}
