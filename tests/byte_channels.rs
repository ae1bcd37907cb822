//! Buffered byte channels: exhaustion and byte accounting.

use anyhow::Result;
use dagflow::buffer::{BufferedReadableByteChannel, BufferedWritableByteChannel, DEFAULT_BLOCK_SIZE};
use proptest::prelude::*;
use std::io::{Cursor, Read, Write};

/// Deterministic pseudo-random bytes (xorshift64).
fn random_bytes(n: usize, mut seed: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        out.extend_from_slice(&seed.to_le_bytes());
    }
    out.truncate(n);
    out
}

fn drain(reader: &mut impl Read, chunk: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0; chunk];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[test]
fn reads_back_a_million_bytes_with_small_and_large_buffers() -> Result<()> {
    let data = random_bytes(1_024_000, 0x9E37_79B9_7F4A_7C15);
    for chunk in [1, 100, DEFAULT_BLOCK_SIZE - 1, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_SIZE * 3 + 7] {
        let mut reader = BufferedReadableByteChannel::new(Cursor::new(data.clone()));
        let read = drain(&mut reader, chunk)?;
        assert_eq!(read.len(), data.len(), "caller buffer of {chunk} bytes");
        assert!(read == data, "caller buffer of {chunk} bytes corrupted data");

        // end of stream is sticky
        let mut scratch = vec![0; chunk];
        assert_eq!(reader.read(&mut scratch)?, 0);
        assert_eq!(reader.read(&mut scratch)?, 0);
        assert_eq!(reader.buffered(), 0);
    }
    Ok(())
}

#[test]
fn writer_then_reader_preserves_totals() -> Result<()> {
    let data = random_bytes(1_024_000, 7);
    let mut writer = BufferedWritableByteChannel::new(Vec::new());
    for piece in data.chunks(333) {
        writer.write_all(piece)?;
    }
    assert_eq!(writer.bytes_written(), data.len() as u64);
    let written = writer.close()?;
    assert_eq!(written.len(), data.len());

    let mut reader = BufferedReadableByteChannel::with_block_size(Cursor::new(written), 4096);
    let mut read = Vec::new();
    reader.read_to_end(&mut read)?;
    assert!(read == data);
    Ok(())
}

#[test]
fn empty_source_is_immediately_exhausted() -> Result<()> {
    let mut reader = BufferedReadableByteChannel::new(Cursor::new(Vec::<u8>::new()));
    let mut buf = [0u8; 16];
    assert_eq!(reader.read(&mut buf)?, 0);
    assert_eq!(reader.read(&mut buf)?, 0);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_sequence_reads_back_in_full(
        data in prop::collection::vec(any::<u8>(), 0..40_000),
        block in 1usize..5_000,
        chunk in 1usize..12_000,
    ) {
        let mut writer = BufferedWritableByteChannel::with_block_size(Vec::new(), block);
        writer.write_all(&data).unwrap();
        let bytes = writer.close().unwrap();
        let mut reader = BufferedReadableByteChannel::with_block_size(Cursor::new(bytes), block);
        let read = drain(&mut reader, chunk).unwrap();
        prop_assert_eq!(read, data);
        let mut scratch = vec![0u8; chunk];
        prop_assert_eq!(reader.read(&mut scratch).unwrap(), 0);
    }
}
