// Privacy Guard — Wire Codec
//
// Every value on the wire is a 4-byte little-endian length followed by that
// many payload bytes. There are no type tags: the reader supplies the
// expected `Shape` and the bytes are interpreted accordingly. Composite
// shapes (records, pairs, sequences) are concatenations of scalar frames.

use std::fmt;
use std::io::{self, Read, Write};

use thiserror::Error;

/// Largest payload a single frame may declare (16 MiB).
///
/// Checked before any allocation so a corrupt length prefix cannot make the
/// reader reserve gigabytes.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Upper bound on capacity reserved up front for a decoded sequence.
const MAX_PREALLOC: usize = 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("length mismatch for {shape}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        shape: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("negative sequence count: {0}")]
    NegativeCount(i32),

    #[error("unexpected value: expected {expected}, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
}

/// A single value in an argument or result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    I32(i32),
    U32(u32),
    Bool(bool),
    Str(String),
    /// Privacy category plus its monitor flag.
    Record { privacy_id: String, policy: i32 },
    Pair(Box<Value>, Box<Value>),
    Seq(Vec<Value>),
}

/// The expected type of a value about to be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    I32,
    U32,
    Bool,
    Str,
    Record,
    Pair(Box<Shape>, Box<Shape>),
    Seq(Box<Shape>),
}

impl Shape {
    pub fn pair(first: Shape, second: Shape) -> Self {
        Shape::Pair(Box::new(first), Box::new(second))
    }

    pub fn seq(element: Shape) -> Self {
        Shape::Seq(Box::new(element))
    }

    fn name(&self) -> &'static str {
        match self {
            Shape::I32 => "i32",
            Shape::U32 => "u32",
            Shape::Bool => "bool",
            Shape::Str => "string",
            Shape::Record => "record",
            Shape::Pair(..) => "pair",
            Shape::Seq(_) => "sequence",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Pair(a, b) => write!(f, "pair<{}, {}>", a, b),
            Shape::Seq(e) => write!(f, "seq<{}>", e),
            other => f.write_str(other.name()),
        }
    }
}

// ─── Encoding ────────────────────────────────────────────────────────────────

impl Value {
    pub fn pair(first: impl Into<Value>, second: impl Into<Value>) -> Self {
        Value::Pair(Box::new(first.into()), Box::new(second.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Record { .. } => "record",
            Value::Pair(..) => "pair",
            Value::Seq(_) => "sequence",
        }
    }

    /// Append the wire encoding of this value to `w`.
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        match self {
            Value::I32(v) => write_frame(w, &v.to_le_bytes()),
            Value::U32(v) => write_frame(w, &v.to_le_bytes()),
            Value::Bool(v) => write_frame(w, &[u8::from(*v)]),
            Value::Str(s) => write_frame(w, s.as_bytes()),
            Value::Record { privacy_id, policy } => {
                write_frame(w, privacy_id.as_bytes())?;
                write_frame(w, &policy.to_le_bytes())
            }
            Value::Pair(first, second) => {
                first.encode(w)?;
                second.encode(w)
            }
            Value::Seq(items) => {
                let count = i32::try_from(items.len()).map_err(|_| CodecError::FrameTooLarge {
                    size: items.len(),
                    max: i32::MAX as usize,
                })?;
                write_frame(w, &count.to_le_bytes())?;
                for item in items {
                    item.encode(w)?;
                }
                Ok(())
            }
        }
    }

    /// Read one value of the given shape. Any failure aborts the whole value.
    pub fn decode<R: Read>(shape: &Shape, r: &mut R) -> Result<Value, CodecError> {
        match shape {
            Shape::I32 => Ok(Value::I32(i32::from_le_bytes(read_fixed(r, shape)?))),
            Shape::U32 => Ok(Value::U32(u32::from_le_bytes(read_fixed(r, shape)?))),
            Shape::Bool => {
                let [byte] = read_fixed::<_, 1>(r, shape)?;
                Ok(Value::Bool(byte != 0))
            }
            Shape::Str => Ok(Value::Str(read_string(r)?)),
            Shape::Record => {
                let privacy_id = read_string(r)?;
                let policy = i32::from_le_bytes(read_fixed(r, &Shape::I32)?);
                Ok(Value::Record { privacy_id, policy })
            }
            Shape::Pair(first, second) => {
                let a = Value::decode(first, r)?;
                let b = Value::decode(second, r)?;
                Ok(Value::Pair(Box::new(a), Box::new(b)))
            }
            Shape::Seq(element) => {
                let count = i32::from_le_bytes(read_fixed(r, &Shape::I32)?);
                if count < 0 {
                    return Err(CodecError::NegativeCount(count));
                }
                let count = count as usize;
                let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
                for _ in 0..count {
                    items.push(Value::decode(element, r)?);
                }
                Ok(Value::Seq(items))
            }
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn into_i32(self) -> Result<i32, CodecError> {
        match self {
            Value::I32(v) => Ok(v),
            other => Err(other.unexpected("i32")),
        }
    }

    pub fn into_bool(self) -> Result<bool, CodecError> {
        match self {
            Value::Bool(v) => Ok(v),
            other => Err(other.unexpected("bool")),
        }
    }

    pub fn into_string(self) -> Result<String, CodecError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.unexpected("string")),
        }
    }

    pub fn into_record(self) -> Result<(String, i32), CodecError> {
        match self {
            Value::Record { privacy_id, policy } => Ok((privacy_id, policy)),
            other => Err(other.unexpected("record")),
        }
    }

    pub fn into_pair(self) -> Result<(Value, Value), CodecError> {
        match self {
            Value::Pair(a, b) => Ok((*a, *b)),
            other => Err(other.unexpected("pair")),
        }
    }

    pub fn into_seq(self) -> Result<Vec<Value>, CodecError> {
        match self {
            Value::Seq(items) => Ok(items),
            other => Err(other.unexpected("sequence")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> CodecError {
        CodecError::UnexpectedValue {
            expected,
            found: self.kind(),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

// ─── Frame Helpers ───────────────────────────────────────────────────────────

fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> Result<(), CodecError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    w.write_all(&(payload.len() as u32).to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

fn read_len<R: Read>(r: &mut R) -> Result<usize, CodecError> {
    let mut prefix = [0u8; 4];
    r.read_exact(&mut prefix)?;
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}

fn read_fixed<R: Read, const N: usize>(r: &mut R, shape: &Shape) -> Result<[u8; N], CodecError> {
    let len = read_len(r)?;
    if len != N {
        return Err(CodecError::LengthMismatch {
            shape: shape.name(),
            expected: N,
            actual: len,
        });
    }
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string<R: Read>(r: &mut R) -> Result<String, CodecError> {
    let len = read_len(r)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    use std::io::Cursor;

    fn round_trip(value: &Value, shape: &Shape) -> Value {
        let mut buf = Vec::new();
        value.encode(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = Value::decode(shape, &mut cursor).unwrap();
        assert_eq!(
            cursor.position() as usize,
            cursor.get_ref().len(),
            "decode must consume exactly the encoded bytes"
        );
        decoded
    }

    fn random_string(rng: &mut impl Rng) -> String {
        let len = rng.gen_range(0..64);
        rng.sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    #[test]
    fn test_i32_is_little_endian_with_length_prefix() {
        let mut buf = Vec::new();
        Value::I32(1).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![4, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_bool_encoding() {
        let mut buf = Vec::new();
        Value::Bool(true).encode(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 0, 0, 0, 1]);
    }

    #[test]
    fn test_string_encoding() {
        let mut buf = Vec::new();
        Value::from("ab").encode(&mut buf).unwrap();
        assert_eq!(buf, vec![2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_random_scalars_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let i: i32 = rng.gen();
            let u: u32 = rng.gen();
            let b: bool = rng.gen();
            let s = random_string(&mut rng);

            assert_eq!(round_trip(&Value::I32(i), &Shape::I32), Value::I32(i));
            assert_eq!(round_trip(&Value::U32(u), &Shape::U32), Value::U32(u));
            assert_eq!(round_trip(&Value::Bool(b), &Shape::Bool), Value::Bool(b));
            assert_eq!(
                round_trip(&Value::Str(s.clone()), &Shape::Str),
                Value::Str(s)
            );
        }
    }

    #[test]
    fn test_random_composites_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let len = rng.gen_range(0..20);
            let items: Vec<Value> = (0..len)
                .map(|_| Value::pair(random_string(&mut rng), rng.gen::<i32>()))
                .collect();
            let value = Value::Seq(items);
            let shape = Shape::seq(Shape::pair(Shape::Str, Shape::I32));
            assert_eq!(round_trip(&value, &shape), value);

            let records: Vec<Value> = (0..len)
                .map(|_| Value::Record {
                    privacy_id: random_string(&mut rng),
                    policy: rng.gen_range(0..2),
                })
                .collect();
            let value = Value::Seq(records);
            assert_eq!(round_trip(&value, &Shape::seq(Shape::Record)), value);
        }
    }

    #[test]
    fn test_empty_string_and_sequence_round_trip() {
        assert_eq!(
            round_trip(&Value::from(""), &Shape::Str),
            Value::Str(String::new())
        );
        let empty = Value::Seq(vec![]);
        assert_eq!(round_trip(&empty, &Shape::seq(Shape::Str)), empty);
    }

    #[test]
    fn test_wrong_fixed_length_is_rejected() {
        let mut buf = Vec::new();
        Value::from("abc").encode(&mut buf).unwrap();
        let err = Value::decode(&Shape::I32, &mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::LengthMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_short_read_is_an_error() {
        let buf = vec![10, 0, 0, 0, b'x'];
        let err = Value::decode(&Shape::Str, &mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }

    #[test]
    fn test_oversized_length_rejected_before_allocation() {
        let buf = (u32::MAX).to_le_bytes().to_vec();
        let err = Value::decode(&Shape::Str, &mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[test]
    fn test_negative_sequence_count_rejected() {
        let mut buf = Vec::new();
        Value::I32(-3).encode(&mut buf).unwrap();
        let err = Value::decode(&Shape::seq(Shape::Str), &mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::NegativeCount(-3)));
    }

    #[test]
    fn test_truncated_sequence_fails_whole_decode() {
        let value = Value::Seq(vec![Value::from("a"), Value::from("b")]);
        let mut buf = Vec::new();
        value.encode(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(Value::decode(&Shape::seq(Shape::Str), &mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let buf = vec![2, 0, 0, 0, 0xff, 0xfe];
        let err = Value::decode(&Shape::Str, &mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidUtf8));
    }

    #[test]
    fn test_accessor_reports_kind_mismatch() {
        let err = Value::from("x").into_i32().unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnexpectedValue {
                expected: "i32",
                found: "string"
            }
        ));
    }
}
