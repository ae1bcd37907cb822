//! Buffered adapters over block-oriented byte channels.
//!
//! Both adapters keep an internal fixed-size block so that many small
//! reads or writes turn into few calls on the wrapped channel. Caller buffers
//! larger than the block bypass it.

use std::io::{self, Read, Write};

/// Default internal block size.
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

/// Buffered reader over a block-oriented channel.
///
/// End of stream (`Ok(0)` for a non-empty destination) is reported only once
/// the wrapped channel is exhausted *and* the internal block is drained, and
/// it is reported again on every later call.
pub struct BufferedReadableByteChannel<R: Read> {
    inner: R,
    block: Box<[u8]>,
    pos: usize,
    filled: usize,
    eof: bool,
}

impl<R: Read> BufferedReadableByteChannel<R> {
    pub fn new(inner: R) -> Self {
        Self::with_block_size(inner, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(inner: R, block_size: usize) -> Self {
        Self {
            inner,
            block: vec![0; block_size.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
            eof: false,
        }
    }

    /// Size of the internal block.
    pub fn block_size(&self) -> usize {
        self.block.len()
    }

    /// Bytes buffered but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.filled - self.pos
    }

    /// Unwrap, dropping any buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_inner(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(dst) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        self.pos = 0;
        self.filled = 0;
        let mut block = std::mem::take(&mut self.block);
        let result = self.read_inner(&mut block);
        self.block = block;
        self.filled = result?;
        Ok(())
    }
}

impl<R: Read> Read for BufferedReadableByteChannel<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        if self.pos == self.filled {
            if self.eof {
                return Ok(0);
            }
            if dst.len() >= self.block.len() {
                return self.read_inner(dst);
            }
            self.refill()?;
            if self.filled == 0 {
                return Ok(0);
            }
        }
        let n = dst.len().min(self.filled - self.pos);
        dst[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Buffered writer over a block-oriented channel.
///
/// Call [`close`](Self::close) to flush and recover the wrapped channel with
/// error reporting; dropping flushes on a best-effort basis.
pub struct BufferedWritableByteChannel<W: Write> {
    inner: Option<W>,
    block: Box<[u8]>,
    filled: usize,
    written: u64,
}

impl<W: Write> BufferedWritableByteChannel<W> {
    pub fn new(inner: W) -> Self {
        Self::with_block_size(inner, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(inner: W, block_size: usize) -> Self {
        Self {
            inner: Some(inner),
            block: vec![0; block_size.max(1)].into_boxed_slice(),
            filled: 0,
            written: 0,
        }
    }

    /// Total bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    fn inner_mut(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("channel already closed"))
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.filled == 0 {
            return Ok(());
        }
        let filled = self.filled;
        let block = std::mem::take(&mut self.block);
        let result = self.inner_mut().and_then(|w| w.write_all(&block[..filled]));
        self.block = block;
        result?;
        self.filled = 0;
        Ok(())
    }

    /// Flush everything and return the wrapped channel.
    ///
    /// # Errors
    /// Propagates write and flush failures of the wrapped channel.
    pub fn close(mut self) -> io::Result<W> {
        self.flush()?;
        self.inner
            .take()
            .ok_or_else(|| io::Error::other("channel already closed"))
    }
}

impl<W: Write> Write for BufferedWritableByteChannel<W> {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        if self.filled + src.len() > self.block.len() {
            self.flush_block()?;
        }
        if src.len() >= self.block.len() {
            self.inner_mut()?.write_all(src)?;
        } else {
            self.block[self.filled..self.filled + src.len()].copy_from_slice(src);
            self.filled += src.len();
        }
        self.written += src.len() as u64;
        Ok(src.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for BufferedWritableByteChannel<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.flush_block();
        }
    }
}
