//! Element codecs: encode and decode a single list element.

use super::cursor::ByteCursor;
use crate::error::{Result, StateError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Name and schema version of an element codec.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecDescriptor {
    pub name: String,
    pub version: u32,
}

impl fmt::Display for CodecDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

/// Serializer for the elements of a list.
///
/// `decode` must consume exactly the bytes `encode` produced for the same
/// element. The encoded form may contain the list delimiter byte; the list
/// format locates delimiters by framing, never by scanning.
pub trait ElementCodec: Send + Sync {
    type Item;

    fn encode(&self, item: &Self::Item, out: &mut Vec<u8>) -> Result<()>;

    fn decode(&self, input: &mut ByteCursor<'_>) -> Result<Self::Item>;

    fn name(&self) -> &str;

    /// Schema version. Changing it means stored lists need migration.
    fn version(&self) -> u32 {
        1
    }

    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor {
            name: self.name().to_string(),
            version: self.version(),
        }
    }
}

/// Fixed-width big-endian `u64`.
#[derive(Clone, Copy, Debug, Default)]
pub struct U64Codec;

impl ElementCodec for U64Codec {
    type Item = u64;

    fn encode(&self, item: &u64, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&item.to_be_bytes());
        Ok(())
    }

    fn decode(&self, input: &mut ByteCursor<'_>) -> Result<u64> {
        input.read_u64_be()
    }

    fn name(&self) -> &str {
        "u64"
    }
}

/// Fixed-width big-endian `i64`.
#[derive(Clone, Copy, Debug, Default)]
pub struct I64Codec;

impl ElementCodec for I64Codec {
    type Item = i64;

    fn encode(&self, item: &i64, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&item.to_be_bytes());
        Ok(())
    }

    fn decode(&self, input: &mut ByteCursor<'_>) -> Result<i64> {
        input.read_i64_be()
    }

    fn name(&self) -> &str {
        "i64"
    }
}

fn write_len(len: usize, out: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| StateError::Serialization(format!("element too large: {} bytes", len)))?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

/// UTF-8 string with a `u32` length prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringCodec;

impl ElementCodec for StringCodec {
    type Item = String;

    fn encode(&self, item: &String, out: &mut Vec<u8>) -> Result<()> {
        write_len(item.len(), out)?;
        out.extend_from_slice(item.as_bytes());
        Ok(())
    }

    fn decode(&self, input: &mut ByteCursor<'_>) -> Result<String> {
        let len = input.read_u32_le()? as usize;
        let bytes = input.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StateError::CorruptEncoding(format!("invalid UTF-8 element: {}", e)))
    }

    fn name(&self) -> &str {
        "string"
    }
}

/// Raw bytes with a `u32` length prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesCodec;

impl ElementCodec for BytesCodec {
    type Item = Vec<u8>;

    fn encode(&self, item: &Vec<u8>, out: &mut Vec<u8>) -> Result<()> {
        write_len(item.len(), out)?;
        out.extend_from_slice(item);
        Ok(())
    }

    fn decode(&self, input: &mut ByteCursor<'_>) -> Result<Vec<u8>> {
        let len = input.read_u32_le()? as usize;
        Ok(input.read_bytes(len)?.to_vec())
    }

    fn name(&self) -> &str {
        "bytes"
    }
}

/// Any serde type, encoded as MessagePack. MessagePack values are
/// self-delimiting, so no extra framing is written.
pub struct MsgPackCodec<T> {
    name: String,
    version: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MsgPackCodec<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_version(name, 1)
    }

    pub fn with_version(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for MsgPackCodec<T> {
    fn clone(&self) -> Self {
        Self::with_version(self.name.clone(), self.version)
    }
}

impl<T> fmt::Debug for MsgPackCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsgPackCodec")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

impl<T> ElementCodec for MsgPackCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = T;

    fn encode(&self, item: &T, out: &mut Vec<u8>) -> Result<()> {
        rmp_serde::encode::write(out, item)?;
        Ok(())
    }

    fn decode(&self, input: &mut ByteCursor<'_>) -> Result<T> {
        rmp_serde::from_read(&mut *input)
            .map_err(|e| StateError::CorruptEncoding(format!("{}: {}", self.name, e)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }
}

/// A value paired with the time (milliseconds) it was last written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtlValue<T> {
    pub value: T,
    pub last_access: i64,
}

impl<T> TtlValue<T> {
    pub fn new(value: T, last_access: i64) -> Self {
        Self { value, last_access }
    }
}

/// Decorator that prefixes every element with its last-access timestamp.
#[derive(Clone, Debug)]
pub struct TtlCodec<C> {
    inner: C,
    name: String,
}

impl<C: ElementCodec> TtlCodec<C> {
    pub fn new(inner: C) -> Self {
        let name = format!("ttl({})", inner.name());
        Self { inner, name }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: ElementCodec> ElementCodec for TtlCodec<C> {
    type Item = TtlValue<C::Item>;

    fn encode(&self, item: &Self::Item, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&item.last_access.to_be_bytes());
        self.inner.encode(&item.value, out)
    }

    fn decode(&self, input: &mut ByteCursor<'_>) -> Result<Self::Item> {
        let last_access = input.read_i64_be()?;
        let value = self.inner.decode(input)?;
        Ok(TtlValue { value, last_access })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.inner.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    fn roundtrip<C: ElementCodec>(codec: &C, item: &C::Item) -> (C::Item, usize, usize)
    where
        C::Item: std::fmt::Debug,
    {
        let mut out = Vec::new();
        codec.encode(item, &mut out).unwrap();
        // Trailing garbage must be left unread.
        out.extend_from_slice(b",tail");
        let mut cursor = ByteCursor::new(&out);
        let decoded = codec.decode(&mut cursor).unwrap();
        (decoded, cursor.position(), out.len() - 5)
    }

    #[test]
    fn test_fixed_width_codecs() {
        let (v, pos, len) = roundtrip(&U64Codec, &0x2c2c_2c2c_u64);
        assert_eq!(v, 0x2c2c_2c2c);
        assert_eq!(pos, len);

        let (v, pos, len) = roundtrip(&I64Codec, &-7);
        assert_eq!(v, -7);
        assert_eq!(pos, len);
    }

    #[test]
    fn test_string_with_delimiter_content() {
        let (v, pos, len) = roundtrip(&StringCodec, &"a,b,,c".to_string());
        assert_eq!(v, "a,b,,c");
        assert_eq!(pos, len);
    }

    #[test]
    fn test_string_invalid_utf8() {
        let data = [2u8, 0, 0, 0, 0xff, 0xfe];
        let err = StringCodec.decode(&mut ByteCursor::new(&data)).unwrap_err();
        assert!(matches!(err, StateError::CorruptEncoding(_)));
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Event {
        id: u32,
        tag: String,
    }

    #[test]
    fn test_msgpack_consumes_exactly_one_value() {
        let codec = MsgPackCodec::<Event>::new("event");
        let event = Event {
            id: 44,
            tag: ",,,".into(),
        };
        let (v, pos, len) = roundtrip(&codec, &event);
        assert_eq!(v, event);
        assert_eq!(pos, len);
    }

    #[test]
    fn test_ttl_codec_wraps_inner() {
        let codec = TtlCodec::new(StringCodec);
        assert_eq!(codec.name(), "ttl(string)");

        let item = TtlValue::new("x".to_string(), 1_700_000_000_000);
        let (v, pos, len) = roundtrip(&codec, &item);
        assert_eq!(v, item);
        assert_eq!(pos, len);
    }

    #[test]
    fn test_descriptor_display() {
        let codec = MsgPackCodec::<Event>::with_version("event", 3);
        assert_eq!(codec.descriptor().to_string(), "event@v3");
    }
}
