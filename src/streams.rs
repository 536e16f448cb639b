// Standard stream handles owned by the client

use std::io::{self, IsTerminal, Read, Write};

/// Input stream held by the client
pub struct In {
    inner: Box<dyn Read + Send>,
}

impl In {
    pub fn new(inner: Box<dyn Read + Send>) -> Self {
        Self { inner }
    }

    /// Process standard input
    pub fn stdin() -> Self {
        Self::new(Box::new(io::stdin()))
    }
}

impl Read for In {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Output stream used as the render target for engine messages
pub struct Out {
    inner: Box<dyn Write + Send>,
    is_terminal: bool,
}

impl Out {
    pub fn new(inner: Box<dyn Write + Send>, is_terminal: bool) -> Self {
        Self { inner, is_terminal }
    }

    /// Process standard output
    pub fn stdout() -> Self {
        let stdout = io::stdout();
        let is_terminal = stdout.is_terminal();
        Self::new(Box::new(stdout), is_terminal)
    }

    /// Whether progress can be redrawn in place
    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }
}

impl Write for Out {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Access to the output and error streams of a command
pub trait Streams {
    fn out(&mut self) -> &mut Out;
    fn err(&mut self) -> &mut (dyn Write + Send);
}
