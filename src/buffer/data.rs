use super::utf;
use std::io::{self, Read, Write};

/// Default initial capacity of a [`DataBuffer`].
pub const DEFAULT_INITIAL_CAPACITY: usize = 256;

/// A growable, position-tracked byte buffer with big-endian primitive access.
///
/// A buffer keeps a single cursor (`position`) and a high-water mark
/// (`limit`, the number of valid bytes). Writes store at the cursor and push
/// the limit forward; reads consume from the cursor up to the limit.
/// [`clear`](Self::clear) rewinds the cursor without discarding data or
/// capacity, which makes write-then-read-back on one buffer possible.
///
/// Growth doubles the capacity until the soft limit is reached. Past the soft
/// limit the buffer grows by exactly what the pending write needs, so a
/// single oversized write still succeeds without pre-allocating beyond it.
///
/// ```
/// use dagflow::buffer::DataBuffer;
///
/// let mut buf = DataBuffer::new();
/// buf.write_i32(42);
/// buf.write_utf("hello").unwrap();
/// buf.clear();
/// assert_eq!(buf.read_i32().unwrap(), 42);
/// assert_eq!(buf.read_utf().unwrap(), "hello");
/// ```
#[derive(Clone, Debug)]
pub struct DataBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    soft_limit: usize,
}

impl Default for DataBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DataBuffer {
    /// Buffer with [`DEFAULT_INITIAL_CAPACITY`] and no soft limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY, usize::MAX)
    }

    /// Buffer with an initial capacity and a soft limit on doubling growth.
    #[must_use]
    pub fn with_capacity(initial: usize, soft_limit: usize) -> Self {
        Self {
            data: vec![0; initial],
            position: 0,
            limit: 0,
            soft_limit: soft_limit.max(initial),
        }
    }

    /// Buffer whose readable contents are a copy of `bytes`, positioned at 0.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = Self::with_capacity(bytes.len(), usize::MAX);
        buf.reset_to(bytes);
        buf
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of valid bytes.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Allocated capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Configured soft limit.
    #[must_use]
    pub fn soft_limit(&self) -> usize {
        self.soft_limit
    }

    /// Number of bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.position)
    }

    /// Whether the valid contents have grown past the soft limit.
    #[must_use]
    pub fn exceeds_soft_limit(&self) -> bool {
        self.limit > self.soft_limit
    }

    /// Rewind the cursor to zero; contents and capacity are kept.
    pub fn clear(&mut self) {
        self.position = 0;
    }

    /// Discard all contents (capacity is kept).
    pub fn reset(&mut self) {
        self.position = 0;
        self.limit = 0;
    }

    /// Replace the contents with a copy of `bytes` and rewind.
    pub fn reset_to(&mut self, bytes: &[u8]) {
        self.reset();
        self.write_raw(bytes);
        self.position = 0;
    }

    /// Replace the contents with exactly `n` bytes read from `reader` and rewind.
    ///
    /// # Errors
    /// Propagates reader errors (`UnexpectedEof` if fewer than `n` bytes
    /// arrive); the buffer is left empty in that case.
    pub fn load_from(&mut self, reader: &mut impl Read, n: usize) -> io::Result<()> {
        self.reset();
        self.ensure_writable(n);
        reader.read_exact(&mut self.data[..n])?;
        self.limit = n;
        Ok(())
    }

    /// Move the cursor. Positions past the limit are clamped to it.
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.limit);
    }

    /// All valid bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    /// Valid bytes from the cursor onwards.
    #[must_use]
    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.position.min(self.limit)..self.limit]
    }

    /// Advance the cursor by `n`, or by what is left if fewer than `n` bytes
    /// remain. Returns the number of bytes actually skipped.
    pub fn skip_bytes(&mut self, n: usize) -> usize {
        let skipped = n.min(self.remaining());
        self.position += skipped;
        skipped
    }

    fn ensure_writable(&mut self, n: usize) {
        let required = self.position + n;
        if required <= self.data.len() {
            return;
        }
        let doubled = self.data.len().saturating_mul(2).max(DEFAULT_INITIAL_CAPACITY.min(self.soft_limit));
        let new_capacity = if doubled.min(self.soft_limit) >= required {
            doubled.min(self.soft_limit)
        } else {
            required
        };
        self.data.resize(new_capacity, 0);
    }

    fn put(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        let end = self.position + bytes.len();
        self.data[self.position..end].copy_from_slice(bytes);
        self.position = end;
        self.limit = self.limit.max(end);
    }

    fn take<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        if self.remaining() < N {
            return Err(eof(N, self.remaining()));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.position..self.position + N]);
        self.position += N;
        Ok(out)
    }

    // ---- writes ----

    /// Write raw bytes.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.put(bytes);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.put(&[u8::from(v)]);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.put(&v.to_be_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.put(&v.to_be_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.put(&v.to_be_bytes());
    }

    /// Write a UTF-16 code unit as two bytes.
    pub fn write_char(&mut self, v: u16) {
        self.write_u16(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.put(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.put(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.put(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.put(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.put(&v.to_bits().to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.put(&v.to_bits().to_be_bytes());
    }

    /// Write a string in length-prefixed modified UTF-8.
    ///
    /// # Errors
    /// `InvalidInput` if the encoded form is longer than 65535 bytes; nothing
    /// is written in that case.
    pub fn write_utf(&mut self, s: &str) -> io::Result<()> {
        let encoded = utf::encode(s)?;
        self.put(&encoded);
        Ok(())
    }

    /// Write the low byte of every UTF-16 unit of `s`, without a length.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_bytes(&mut self, s: &str) {
        let bytes: Vec<u8> = s.encode_utf16().map(|c| c as u8).collect();
        self.put(&bytes);
    }

    /// Write every UTF-16 unit of `s` as two bytes, without a length.
    pub fn write_chars(&mut self, s: &str) {
        for unit in s.encode_utf16() {
            self.write_char(unit);
        }
    }

    // ---- reads ----

    /// Fill `dst` completely from the buffer.
    ///
    /// # Errors
    /// `UnexpectedEof` if fewer than `dst.len()` bytes remain; the cursor is
    /// not moved in that case.
    pub fn read_fully(&mut self, dst: &mut [u8]) -> io::Result<()> {
        if self.remaining() < dst.len() {
            return Err(eof(dst.len(), self.remaining()));
        }
        dst.copy_from_slice(&self.data[self.position..self.position + dst.len()]);
        self.position += dst.len();
        Ok(())
    }

    pub fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> io::Result<i8> {
        self.take().map(i8::from_be_bytes)
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        self.take().map(u16::from_be_bytes)
    }

    pub fn read_i16(&mut self) -> io::Result<i16> {
        self.take().map(i16::from_be_bytes)
    }

    pub fn read_char(&mut self) -> io::Result<u16> {
        self.read_u16()
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.take().map(u32::from_be_bytes)
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.take().map(i32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> io::Result<u64> {
        self.take().map(u64::from_be_bytes)
    }

    pub fn read_i64(&mut self) -> io::Result<i64> {
        self.take().map(i64::from_be_bytes)
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        self.take().map(|b| f32::from_bits(u32::from_be_bytes(b)))
    }

    pub fn read_f64(&mut self) -> io::Result<f64> {
        self.take().map(|b| f64::from_bits(u64::from_be_bytes(b)))
    }

    /// Read a string written by [`write_utf`](Self::write_utf).
    ///
    /// # Errors
    /// `UnexpectedEof` on truncated input, `InvalidData` on malformed input.
    pub fn read_utf(&mut self) -> io::Result<String> {
        let start = self.position;
        let len = usize::from(self.read_u16()?);
        if self.remaining() < len {
            self.position = start;
            return Err(eof(len, self.remaining()));
        }
        let body = &self.data[self.position..self.position + len];
        match utf::decode(body) {
            Ok(s) => {
                self.position += len;
                Ok(s)
            }
            Err(e) => {
                self.position = start;
                Err(e)
            }
        }
    }
}

fn eof(wanted: usize, available: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("buffer underflow: wanted {wanted} bytes, {available} available"),
    )
}

impl Read for DataBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for DataBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.put(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_soft_limit_then_grows_exactly() {
        let mut buf = DataBuffer::with_capacity(8, 32);
        for i in 0..8 {
            buf.write_i32(i);
        }
        assert_eq!(buf.capacity(), 32);
        buf.write_i32(8);
        assert_eq!(buf.capacity(), 36);
        buf.write_i64(9);
        assert_eq!(buf.capacity(), 44);
    }

    #[test]
    fn failed_utf_read_keeps_position() {
        let mut buf = DataBuffer::new();
        buf.write_u16(10);
        buf.write_raw(b"abc");
        buf.clear();
        assert!(buf.read_utf().is_err());
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn write_at_rewound_position_overwrites() {
        let mut buf = DataBuffer::new();
        buf.write_i32(1);
        buf.write_i32(2);
        buf.clear();
        buf.write_i32(7);
        assert_eq!(buf.limit(), 8);
        buf.clear();
        assert_eq!(buf.read_i32().unwrap(), 7);
        assert_eq!(buf.read_i32().unwrap(), 2);
    }
}
