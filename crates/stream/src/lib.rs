// https://docs.oracle.com/javase/8/docs/platform/serialization/spec/protocol.html

pub mod constants;
mod connect;
mod content;
mod error;
mod handles;
pub mod mutf8;
mod names;
mod object_stream;
mod parser;
mod reader;

pub use content::{
    ArrayObject, BlockData, ClassDesc, ClassDescKind, ClassObject, Content, ContentArena,
    ContentRef, DescFlags, EnumObject, ExceptionState, Field, FieldType, Instance, StringObject,
    Value,
};
pub use error::StreamError;
pub use handles::{Handle, HandleMap, HandleTable};
pub use names::{decode_class_name, fix_class_name, resolve_java_type, unicode_escape};
pub use object_stream::ObjectStream;
pub use parser::Parser;
pub use reader::DataReader;

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
