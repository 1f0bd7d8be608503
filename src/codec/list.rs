//! Delimited list format.
//!
//! An encoded list is `e1 , e2 , ... , en` with a single [`DELIMITER`] byte
//! between elements and none after the last. Because the store's merge
//! operator joins fragments with the same delimiter, appending a fragment is
//! equivalent to extending the list.

use super::cursor::ByteCursor;
use super::element::ElementCodec;
use crate::error::{Result, StateError};
use tracing::warn;

/// Separator between encoded elements, shared with the store's append
/// merge operator.
pub const DELIMITER: u8 = b',';

/// Encode one element as a single-element fragment.
pub fn encode_element<C: ElementCodec>(codec: &C, item: &C::Item) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    codec.encode(item, &mut out)?;
    Ok(out)
}

/// Encode a sequence of elements. An empty slice encodes to an empty buffer;
/// callers treat that as "no value" rather than storing it.
pub fn encode_list<C: ElementCodec>(codec: &C, items: &[C::Item]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        codec.encode(item, &mut out)?;
    }
    Ok(out)
}

/// Decode the element at the cursor and consume the delimiter after it.
///
/// Returns `None` once the input is exhausted.
pub fn decode_next<C: ElementCodec>(
    codec: &C,
    cursor: &mut ByteCursor<'_>,
) -> Result<Option<C::Item>> {
    if cursor.is_empty() {
        return Ok(None);
    }
    let start = cursor.position();
    let item = codec.decode(cursor)?;
    if cursor.position() == start {
        return Err(StateError::CorruptEncoding(format!(
            "codec {} consumed no bytes at offset {}",
            codec.name(),
            start
        )));
    }
    if !cursor.is_empty() {
        let at = cursor.position();
        let sep = cursor.read_u8()?;
        if sep != DELIMITER {
            return Err(StateError::CorruptEncoding(format!(
                "expected delimiter at offset {}, found 0x{:02x}",
                at, sep
            )));
        }
    }
    Ok(Some(item))
}

/// Decode a whole stored value. An absent value is an empty list.
pub fn decode_list<C: ElementCodec>(codec: &C, bytes: Option<&[u8]>) -> Result<Vec<C::Item>> {
    match bytes {
        None => Ok(Vec::new()),
        Some(bytes) => ListDecoder::new(codec, bytes).collect(),
    }
}

/// Incremental decoder yielding one element at a time.
///
/// After an error the decoder is fused and yields nothing further.
pub struct ListDecoder<'a, 'c, C> {
    codec: &'c C,
    cursor: ByteCursor<'a>,
    element_start: usize,
    failed: bool,
}

impl<'a, 'c, C: ElementCodec> ListDecoder<'a, 'c, C> {
    pub fn new(codec: &'c C, bytes: &'a [u8]) -> Self {
        Self {
            codec,
            cursor: ByteCursor::new(bytes),
            element_start: 0,
            failed: false,
        }
    }

    /// Offset in the input where the most recently yielded element began.
    pub fn element_start(&self) -> usize {
        self.element_start
    }

    /// Bytes from the start of the most recently yielded element to the end.
    pub fn suffix_from_current(&self) -> &'a [u8] {
        &self.cursor.buffer()[self.element_start..]
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }
}

impl<C: ElementCodec> Iterator for ListDecoder<'_, '_, C> {
    type Item = Result<C::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.element_start = self.cursor.position();
        match decode_next(self.codec, &mut self.cursor) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Outcome of [`verify_codec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConformanceReport {
    pub codec: String,
    pub samples: usize,
    /// Samples whose encoding contains the delimiter byte. Harmless for a
    /// self-framing codec, fatal for one that is not.
    pub delimiter_collisions: usize,
}

/// Check that a codec is usable for delimited lists.
///
/// Every sample must round-trip and decoding must stop exactly at the end of
/// its encoding, even when a delimiter and further bytes follow.
pub fn verify_codec<C>(codec: &C, samples: &[C::Item]) -> Result<ConformanceReport>
where
    C: ElementCodec,
    C::Item: PartialEq + std::fmt::Debug,
{
    let mut delimiter_collisions = 0;
    for sample in samples {
        let encoded = encode_element(codec, sample)?;
        if encoded.is_empty() {
            return Err(StateError::CorruptEncoding(format!(
                "codec {} encodes {:?} to zero bytes",
                codec.name(),
                sample
            )));
        }
        if encoded.contains(&DELIMITER) {
            delimiter_collisions += 1;
        }

        let mut framed = encoded.clone();
        framed.push(DELIMITER);
        framed.extend_from_slice(&encoded);
        let mut cursor = ByteCursor::new(&framed);
        let decoded = codec.decode(&mut cursor)?;
        if cursor.position() != encoded.len() {
            return Err(StateError::CorruptEncoding(format!(
                "codec {} is not self-framing: consumed {} of {} bytes for {:?}",
                codec.name(),
                cursor.position(),
                encoded.len(),
                sample
            )));
        }
        if &decoded != sample {
            return Err(StateError::CorruptEncoding(format!(
                "codec {} does not round-trip: {:?} decoded as {:?}",
                codec.name(),
                sample,
                decoded
            )));
        }
    }

    if delimiter_collisions > 0 {
        warn!(
            codec = codec.name(),
            delimiter_collisions,
            "encoded elements contain the list delimiter; decoding relies on codec framing"
        );
    }

    Ok(ConformanceReport {
        codec: codec.name().to_string(),
        samples: samples.len(),
        delimiter_collisions,
    })
}
