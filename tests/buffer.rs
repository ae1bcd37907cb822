//! Data buffer round trips and growth.

use anyhow::Result;
use dagflow::buffer::DataBuffer;
use proptest::prelude::*;
use std::io::ErrorKind;

#[derive(Clone, Debug, PartialEq)]
enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    Char(u16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Utf(String),
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<u8>().prop_map(Value::U8),
        any::<i8>().prop_map(Value::I8),
        any::<u16>().prop_map(Value::U16),
        any::<i16>().prop_map(Value::I16),
        any::<u16>().prop_map(Value::Char),
        any::<u32>().prop_map(Value::U32),
        any::<i32>().prop_map(Value::I32),
        any::<u64>().prop_map(Value::U64),
        any::<i64>().prop_map(Value::I64),
        any::<f32>().prop_filter("NaN never equals itself", |f| !f.is_nan()).prop_map(Value::F32),
        any::<f64>().prop_filter("NaN never equals itself", |f| !f.is_nan()).prop_map(Value::F64),
        ".{0,40}".prop_map(Value::Utf),
    ]
}

fn write(buf: &mut DataBuffer, v: &Value) {
    match v {
        Value::Bool(x) => buf.write_bool(*x),
        Value::U8(x) => buf.write_u8(*x),
        Value::I8(x) => buf.write_i8(*x),
        Value::U16(x) => buf.write_u16(*x),
        Value::I16(x) => buf.write_i16(*x),
        Value::Char(x) => buf.write_char(*x),
        Value::U32(x) => buf.write_u32(*x),
        Value::I32(x) => buf.write_i32(*x),
        Value::U64(x) => buf.write_u64(*x),
        Value::I64(x) => buf.write_i64(*x),
        Value::F32(x) => buf.write_f32(*x),
        Value::F64(x) => buf.write_f64(*x),
        Value::Utf(s) => buf.write_utf(s).unwrap(),
    }
}

fn read_like(buf: &mut DataBuffer, v: &Value) -> std::io::Result<Value> {
    Ok(match v {
        Value::Bool(_) => Value::Bool(buf.read_bool()?),
        Value::U8(_) => Value::U8(buf.read_u8()?),
        Value::I8(_) => Value::I8(buf.read_i8()?),
        Value::U16(_) => Value::U16(buf.read_u16()?),
        Value::I16(_) => Value::I16(buf.read_i16()?),
        Value::Char(_) => Value::Char(buf.read_char()?),
        Value::U32(_) => Value::U32(buf.read_u32()?),
        Value::I32(_) => Value::I32(buf.read_i32()?),
        Value::U64(_) => Value::U64(buf.read_u64()?),
        Value::I64(_) => Value::I64(buf.read_i64()?),
        Value::F32(_) => Value::F32(buf.read_f32()?),
        Value::F64(_) => Value::F64(buf.read_f64()?),
        Value::Utf(_) => Value::Utf(buf.read_utf()?),
    })
}

proptest! {
    #[test]
    fn single_value_round_trips(v in value()) {
        let mut buf = DataBuffer::new();
        write(&mut buf, &v);
        let written = buf.position();
        buf.clear();
        prop_assert_eq!(read_like(&mut buf, &v).unwrap(), v);
        prop_assert_eq!(buf.position(), written);
    }

    #[test]
    fn mixed_sequence_round_trips_through_growth(values in prop::collection::vec(value(), 0..200)) {
        let mut buf = DataBuffer::with_capacity(4, 64);
        let mut positions = Vec::with_capacity(values.len());
        for v in &values {
            write(&mut buf, v);
            positions.push(buf.position());
        }
        buf.clear();
        for (v, end) in values.iter().zip(positions) {
            prop_assert_eq!(&read_like(&mut buf, v).unwrap(), v);
            prop_assert_eq!(buf.position(), end);
        }
        prop_assert_eq!(buf.remaining(), 0);
    }
}

#[test]
fn growth_past_soft_limit_keeps_every_value() -> Result<()> {
    let soft_limit = 1024;
    let mut buf = DataBuffer::with_capacity(16, soft_limit);
    let count = soft_limit / 8 + 1;
    for i in 0..count {
        buf.write_u64(i as u64);
    }
    assert!(buf.exceeds_soft_limit());
    assert_eq!(buf.limit(), count * 8);
    assert!(buf.capacity() >= count * 8);
    // past the limit the buffer grows by exactly the pending write
    assert_eq!(buf.capacity(), count * 8);

    buf.clear();
    for i in 0..count {
        assert_eq!(buf.read_u64()?, i as u64);
    }
    Ok(())
}

#[test]
fn single_write_larger_than_soft_limit_succeeds() -> Result<()> {
    let mut buf = DataBuffer::with_capacity(8, 32);
    let blob = vec![0xAB; 100];
    buf.write_raw(&blob);
    assert_eq!(buf.capacity(), 100);
    buf.clear();
    let mut out = vec![0; 100];
    buf.read_fully(&mut out)?;
    assert_eq!(out, blob);
    Ok(())
}

#[test]
fn reading_past_the_end_is_unexpected_eof() {
    let mut buf = DataBuffer::new();
    buf.write_u16(7);
    buf.clear();
    let err = buf.read_u32().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    // the failed read consumed nothing
    assert_eq!(buf.read_u16().unwrap(), 7);
}

#[test]
fn oversized_utf_is_rejected() {
    let mut buf = DataBuffer::new();
    let long = "x".repeat(65_536);
    let err = buf.write_utf(&long).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(buf.limit(), 0);
    buf.write_utf(&long[..65_535]).unwrap();
    buf.clear();
    assert_eq!(buf.read_utf().unwrap().len(), 65_535);
}

#[test]
fn skip_and_seek_stay_within_contents() {
    let mut buf = DataBuffer::from_bytes(&[1, 2, 3, 4]);
    assert_eq!(buf.skip_bytes(3), 3);
    assert_eq!(buf.skip_bytes(3), 1);
    buf.seek(10);
    assert_eq!(buf.position(), 4);
    buf.seek(1);
    assert_eq!(buf.read_u8().unwrap(), 2);
}
