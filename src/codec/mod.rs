//! Element codecs and the delimited list format built on them.

mod cursor;
mod element;
mod list;

pub use cursor::ByteCursor;
pub use element::{
    BytesCodec, CodecDescriptor, ElementCodec, I64Codec, MsgPackCodec, StringCodec, TtlCodec,
    TtlValue, U64Codec,
};
pub use list::{
    decode_list, decode_next, encode_element, encode_list, verify_codec, ConformanceReport,
    ListDecoder, DELIMITER,
};
