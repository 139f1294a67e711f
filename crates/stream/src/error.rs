use thiserror::Error;

use crate::content::{ContentRef, DescFlags};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("stream magic mismatch: expected 0xaced, got {0:#06x}")]
    BadMagic(u16),
    #[error("stream version mismatch: expected 5, got {0}")]
    BadVersion(u16),
    #[error("unknown type code in stream: {0:#04x}")]
    InvalidTypeCode(u8),
    #[error("block data not allowed here: {0:#04x}")]
    UnexpectedBlockData(u8),
    #[error("invalid field type code: {0:#04x}")]
    InvalidFieldType(u8),
    #[error("invalid field count: {0}")]
    InvalidFieldCount(i16),
    #[error("invalid proxy interface count: {0}")]
    InvalidInterfaceCount(i32),
    #[error("invalid array size: {0}")]
    InvalidArraySize(i32),
    #[error("invalid block data size: {0}")]
    InvalidBlockDataSize(i32),
    #[error("invalid long string length: {0}")]
    InvalidStringLength(i64),
    #[error("expected a string, got type code {0:#04x}")]
    InvalidStringCode(u8),
    #[error("class description can't be null here")]
    NullClassDesc,
    #[error("trying to rebind handle {0:#x}")]
    HandleCollision(i32),
    #[error("no entry for handle {0:#x}")]
    UnboundHandle(i32),
    #[error("expected {0}, found {1}")]
    UnexpectedContent(&'static str, &'static str),
    #[error("improperly-encoded null in modified utf-8 string")]
    NullInUtf,
    #[error("invalid byte in modified utf-8 string: {0:#04x}")]
    InvalidUtfByte(u8),
    #[error("continuation byte in modified utf-8 string has wrong prefix")]
    BadUtfContinuation,
    #[error("unpaired surrogate in modified utf-8 string")]
    UnpairedSurrogate,
    #[error("unexpected end of modified utf-8 string")]
    TruncatedUtf,
    #[error("incompatible descriptor flags: {0:?}")]
    IncompatibleFlags(DescFlags),
    #[error("externalizable class data written without block data; can't interpret it")]
    OpaqueExternalData,
    #[error("{0}")]
    Validity(String),
    /// Internal signal: a serialized exception object was decoded inside a
    /// nested read. Converted back into content at the read-content boundary;
    /// never escapes `parse`.
    #[error("serialized exception read during stream")]
    ExceptionRead(ContentRef),
}
