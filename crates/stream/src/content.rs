use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

use bitflags::bitflags;

use crate::handles::Handle;
use crate::{Result, StreamError};

bitflags! {
    /// Descriptor flag bits (SC_*) carried by every class description.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DescFlags: u8 {
        const WRITE_METHOD = 0x01;
        const SERIALIZABLE = 0x02;
        const EXTERNALIZABLE = 0x04;
        const BLOCK_DATA = 0x08;
        const ENUM = 0x10;
    }
}

/// Index of a content node in the arena.
///
/// All links between content items are arena indices rather than owning
/// pointers: class descriptions reference themselves through their annotation
/// and super chains, and the member-class pass adds outer/inner links on top
/// of that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentRef(pub(crate) usize);

/// Owns every content node produced by a parse.
#[derive(Debug, Default)]
pub struct ContentArena {
    nodes: Vec<Content>,
}

impl ContentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, content: Content) -> ContentRef {
        let r = ContentRef(self.nodes.len());
        self.nodes.push(content);
        r
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContentRef, &Content)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, content)| (ContentRef(i), content))
    }

    pub fn handle_of(&self, r: ContentRef) -> Option<Handle> {
        self[r].handle()
    }

    pub fn is_exception_object(&self, r: ContentRef) -> bool {
        matches!(&self[r], Content::Instance(i) if i.is_exception_object)
    }
}

impl Index<ContentRef> for ContentArena {
    type Output = Content;

    fn index(&self, r: ContentRef) -> &Content {
        &self.nodes[r.0]
    }
}

impl IndexMut<ContentRef> for ContentArena {
    fn index_mut(&mut self, r: ContentRef) -> &mut Content {
        &mut self.nodes[r.0]
    }
}

/// Typed access to an arena slot, with the variant check the protocol demands
/// at every reference-resolution site.
#[macro_export]
macro_rules! expect_content {
    ($arena:expr, $r:expr, $variant:ident) => {
        match &$arena[$r] {
            $crate::Content::$variant(ref c) => Ok(c),
            c => Err($crate::StreamError::UnexpectedContent(
                stringify!($variant),
                c.kind_name(),
            )),
        }
    };
}

#[macro_export]
macro_rules! expect_content_mut {
    ($arena:expr, $r:expr, $variant:ident) => {
        match &mut $arena[$r] {
            $crate::Content::$variant(ref mut c) => Ok(c),
            c => Err($crate::StreamError::UnexpectedContent(
                stringify!($variant),
                c.kind_name(),
            )),
        }
    };
}

/// A single item read from the stream.
#[derive(Debug)]
pub enum Content {
    String(StringObject),
    ClassDesc(ClassDesc),
    Class(ClassObject),
    Enum(EnumObject),
    Array(ArrayObject),
    Instance(Instance),
    BlockData(BlockData),
    ExceptionState(ExceptionState),
}

impl Content {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Content::String(_) => "String",
            Content::ClassDesc(_) => "ClassDesc",
            Content::Class(_) => "Class",
            Content::Enum(_) => "Enum",
            Content::Array(_) => "Array",
            Content::Instance(_) => "Instance",
            Content::BlockData(_) => "BlockData",
            Content::ExceptionState(_) => "ExceptionState",
        }
    }

    /// Wire handle, if this content kind carries one.
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Content::String(s) => Some(s.handle),
            Content::ClassDesc(c) => Some(c.handle),
            Content::Class(c) => Some(c.handle),
            Content::Enum(e) => Some(e.handle),
            Content::Array(a) => Some(a.handle),
            Content::Instance(i) => Some(i.handle),
            Content::BlockData(_) => None,
            Content::ExceptionState(e) => Some(e.handle),
        }
    }
}

/// A serialized string plus the length of its modified-UTF-8 source bytes.
#[derive(Debug)]
pub struct StringObject {
    pub handle: Handle,
    pub value: String,
    pub byte_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassDescKind {
    Normal,
    Proxy,
}

/// Stream representation of a class: serial version id, flags, declared
/// fields, annotations, and super-class linkage. Proxy descriptions carry
/// interface names instead of fields and a SUID.
#[derive(Debug)]
pub struct ClassDesc {
    pub handle: Handle,
    pub kind: ClassDescKind,
    pub name: String,
    pub serial_version_uid: i64,
    pub flags: DescFlags,
    pub fields: Vec<Field>,
    pub annotations: Vec<Option<ContentRef>>,
    pub super_class: Option<ContentRef>,
    pub interfaces: Vec<String>,
    /// Filled as enum constants referencing this description are read.
    pub enum_constants: Vec<String>,
    /// Filled by the member-class pass.
    pub inner_classes: Vec<ContentRef>,
    pub is_inner_class: bool,
    pub is_static_member_class: bool,
    pub is_local_inner_class: bool,
}

impl ClassDesc {
    pub fn new(kind: ClassDescKind, handle: Handle) -> Self {
        Self {
            handle,
            kind,
            name: String::new(),
            serial_version_uid: 0,
            flags: DescFlags::empty(),
            fields: Vec::new(),
            annotations: Vec::new(),
            super_class: None,
            interfaces: Vec::new(),
            enum_constants: Vec::new(),
            inner_classes: Vec::new(),
            is_inner_class: false,
            is_static_member_class: false,
            is_local_inner_class: false,
        }
    }

    pub fn is_array_class(&self) -> bool {
        self.name.starts_with('[')
    }

    pub fn validate(&self) -> Result<()> {
        if self.flags.contains(DescFlags::SERIALIZABLE | DescFlags::EXTERNALIZABLE) {
            return Err(StreamError::IncompatibleFlags(self.flags));
        }
        if !self
            .flags
            .intersects(DescFlags::SERIALIZABLE | DescFlags::EXTERNALIZABLE)
            && !self.fields.is_empty()
        {
            return Err(StreamError::Validity(format!(
                "non-serializable, non-externalizable class {} has fields",
                self.name
            )));
        }
        if self.flags.contains(DescFlags::ENUM) && !self.fields.is_empty() {
            return Err(StreamError::Validity(format!(
                "enum class {} has fields",
                self.name
            )));
        }
        Ok(())
    }
}

/// Primitive and reference field type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object,
    Array,
}

impl TryFrom<u8> for FieldType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            b'B' => Ok(FieldType::Byte),
            b'C' => Ok(FieldType::Char),
            b'D' => Ok(FieldType::Double),
            b'F' => Ok(FieldType::Float),
            b'I' => Ok(FieldType::Int),
            b'J' => Ok(FieldType::Long),
            b'S' => Ok(FieldType::Short),
            b'Z' => Ok(FieldType::Boolean),
            b'L' => Ok(FieldType::Object),
            b'[' => Ok(FieldType::Array),
            _ => Err(value),
        }
    }
}

impl FieldType {
    /// Java-language name for primitive kinds; object and array kinds need
    /// their type descriptor resolved instead.
    pub fn primitive_name(self) -> Option<&'static str> {
        match self {
            FieldType::Byte => Some("byte"),
            FieldType::Char => Some("char"),
            FieldType::Double => Some("double"),
            FieldType::Float => Some("float"),
            FieldType::Int => Some("int"),
            FieldType::Long => Some("long"),
            FieldType::Short => Some("short"),
            FieldType::Boolean => Some("boolean"),
            FieldType::Object | FieldType::Array => None,
        }
    }
}

/// A declared field within a class description. Fields have no handle of
/// their own; object and array kinds reference the string holding their JVM
/// type descriptor (e.g. `Lfoo/bar/Baz;` or `[I`).
#[derive(Debug)]
pub struct Field {
    pub ty: FieldType,
    pub name: String,
    pub class_name: Option<ContentRef>,
    /// Set by the member-class pass on synthetic enclosing-instance fields;
    /// the class printer hides these.
    pub is_inner_class_reference: bool,
}

/// An instance of type Class written to the stream.
#[derive(Debug)]
pub struct ClassObject {
    pub handle: Handle,
    pub class_desc: ContentRef,
}

/// An enum constant: just its class description and the constant's string.
#[derive(Debug)]
pub struct EnumObject {
    pub handle: Handle,
    pub class_desc: ContentRef,
    pub value: ContentRef,
}

/// A serialized array and its element values. For primitive arrays the class
/// description is named `[x` where x is the element's field type code.
#[derive(Debug)]
pub struct ArrayObject {
    pub handle: Handle,
    pub class_desc: ContentRef,
    pub element_type: FieldType,
    pub elements: Vec<Value>,
}

/// A plain object instance: per-class field values and per-class object
/// annotations, keyed by the class descriptions of its hierarchy.
#[derive(Debug)]
pub struct Instance {
    pub handle: Handle,
    pub class_desc: ContentRef,
    /// Field values in declared order, for each serializable member of the
    /// hierarchy.
    pub field_data: BTreeMap<ContentRef, Vec<Value>>,
    pub annotations: BTreeMap<ContentRef, Vec<Option<ContentRef>>>,
    pub is_exception_object: bool,
}

/// Opaque buffer written between content items by custom write logic.
#[derive(Debug)]
pub struct BlockData {
    pub buf: Vec<u8>,
}

/// A serialized exception plus the raw bytes of the enclosing partial write.
/// Adopts the wrapped exception's handle.
#[derive(Debug)]
pub struct ExceptionState {
    pub handle: Handle,
    pub exception: ContentRef,
    pub data: Vec<u8>,
}

/// A single field or array element value: a boxed primitive, a nested content
/// item, or null.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(i8),
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(Option<ContentRef>),
}
