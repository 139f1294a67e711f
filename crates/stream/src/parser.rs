use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};

use log::{debug, warn};

use crate::connect;
use crate::constants::{
    STREAM_MAGIC, STREAM_VERSION, TC_ARRAY, TC_BLOCKDATA, TC_BLOCKDATALONG, TC_CLASS, TC_CLASSDESC,
    TC_ENDBLOCKDATA, TC_ENUM, TC_EXCEPTION, TC_LONGSTRING, TC_NULL, TC_OBJECT, TC_PROXYCLASSDESC,
    TC_REFERENCE, TC_RESET, TC_STRING,
};
use crate::content::{
    ArrayObject, BlockData, ClassDesc, ClassDescKind, ClassObject, Content, ContentArena,
    ContentRef, DescFlags, EnumObject, ExceptionState, Field, FieldType, Instance, StringObject,
    Value,
};
use crate::handles::HandleTable;
use crate::mutf8;
use crate::names::decode_class_name;
use crate::object_stream::ObjectStream;
use crate::reader::DataReader;
use crate::{expect_content, expect_content_mut, Result, StreamError};

/// Stateful decoder for the stream grammar. Owns the reader, the handle
/// table, and the arena every content node lives in.
pub struct Parser<R> {
    r: DataReader<R>,
    arena: ContentArena,
    handles: HandleTable,
    contents: Vec<Option<ContentRef>>,
    exception_data: Option<Vec<u8>>,
}

impl<R: Read> Parser<R> {
    pub fn new(r: R) -> Self {
        Self {
            r: DataReader::new(r),
            arena: ContentArena::new(),
            handles: HandleTable::new(),
            contents: Vec::new(),
            exception_data: None,
        }
    }

    /// Reads the whole stream, then runs validation and (optionally) the
    /// member-class pass over the final epoch.
    pub fn parse(mut self, should_connect: bool) -> Result<ObjectStream> {
        self.parse_header()?;
        loop {
            self.r.mark();
            let tc = match self.r.read_u8() {
                Ok(tc) => tc,
                Err(StreamError::Io(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };
            if tc == TC_RESET {
                debug!("reset ordered");
                self.handles.reset();
                continue;
            }
            let mut item = self.read_content(tc, true)?;
            if let Some(r) = item {
                if self.arena.is_exception_object(r) {
                    let data = self
                        .exception_data
                        .take()
                        .unwrap_or_else(|| self.r.snapshot());
                    let handle = expect_content!(self.arena, r, Instance)?.handle;
                    item = Some(self.arena.alloc(Content::ExceptionState(ExceptionState {
                        handle,
                        exception: r,
                        data,
                    })));
                }
            }
            match item {
                Some(r) => debug!("read: {}", self.arena[r].kind_name()),
                None => debug!("read: null"),
            }
            self.contents.push(item);
        }
        self.validate()?;
        if should_connect {
            connect::connect_member_classes(&mut self.arena, self.handles.current())?;
            self.validate()?;
        }
        let final_handles = self.handles.current().clone();
        let handle_maps = self.handles.into_epochs();
        Ok(ObjectStream {
            arena: self.arena,
            contents: self.contents,
            handle_maps,
            final_handles,
        })
    }

    fn parse_header(&mut self) -> Result<()> {
        let magic = self.r.read_u16()?;
        if magic != STREAM_MAGIC {
            return Err(StreamError::BadMagic(magic));
        }
        let version = self.r.read_u16()?;
        if version != STREAM_VERSION {
            return Err(StreamError::BadVersion(version));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for &r in self.handles.current().values() {
            if let Content::ClassDesc(cd) = &self.arena[r] {
                cd.validate()?;
            }
        }
        Ok(())
    }

    /// Reads one item by the grammar's "content" rule. `block_data_allowed`
    /// is the difference between the "content" and "object" entry rules.
    ///
    /// An embedded serialized exception unwinds whatever read was in
    /// progress; the distinguished error is converted back into a normal
    /// result here so callers see only the exception object.
    fn read_content(&mut self, tc: u8, block_data_allowed: bool) -> Result<Option<ContentRef>> {
        let result = match tc {
            TC_OBJECT => self.read_new_object().map(Some),
            TC_CLASS => self.read_new_class().map(Some),
            TC_ARRAY => self.read_new_array().map(Some),
            TC_STRING | TC_LONGSTRING => self.read_new_string(tc).map(Some),
            TC_ENUM => self.read_new_enum().map(Some),
            TC_CLASSDESC | TC_PROXYCLASSDESC => self.read_new_class_desc(tc).map(Some),
            TC_REFERENCE => self.read_prev_object().map(Some),
            TC_NULL => Ok(None),
            TC_EXCEPTION => self.read_exception().map(Some),
            TC_BLOCKDATA | TC_BLOCKDATALONG => {
                if block_data_allowed {
                    self.read_block_data(tc).map(Some)
                } else {
                    Err(StreamError::UnexpectedBlockData(tc))
                }
            }
            _ => Err(StreamError::InvalidTypeCode(tc)),
        };
        match result {
            Err(StreamError::ExceptionRead(r)) => Ok(Some(r)),
            other => other,
        }
    }

    /// classDesc rule: a new description, a back-reference, or null.
    fn read_class_desc(&mut self) -> Result<Option<ContentRef>> {
        let tc = self.r.read_u8()?;
        self.handle_class_desc(tc, false)
    }

    fn read_new_class_desc(&mut self, tc: u8) -> Result<ContentRef> {
        self.handle_class_desc(tc, true)?
            .ok_or(StreamError::NullClassDesc)
    }

    fn handle_class_desc(&mut self, tc: u8, must_be_new: bool) -> Result<Option<ContentRef>> {
        match tc {
            TC_CLASSDESC => {
                let name = self.r.read_utf()?;
                let serial_version_uid = self.r.read_i64()?;
                let handle = self.handles.allocate();
                // Bind before reading any further: the annotation list and
                // the super chain may refer back to this very description.
                let mut cd = ClassDesc::new(ClassDescKind::Normal, handle);
                cd.name = name;
                cd.serial_version_uid = serial_version_uid;
                let r = self.arena.alloc(Content::ClassDesc(cd));
                self.handles.bind(handle, r)?;
                let flags = DescFlags::from_bits_truncate(self.r.read_u8()?);
                let field_count = self.r.read_i16()?;
                if field_count < 0 {
                    return Err(StreamError::InvalidFieldCount(field_count));
                }
                let mut fields = Vec::with_capacity(field_count as usize);
                for _ in 0..field_count {
                    fields.push(self.read_field()?);
                }
                {
                    let cd = expect_content_mut!(self.arena, r, ClassDesc)?;
                    cd.flags = flags;
                    cd.fields = fields;
                }
                let annotations = self.read_class_annotation()?;
                let super_class = self.read_class_desc()?;
                let cd = expect_content_mut!(self.arena, r, ClassDesc)?;
                cd.annotations = annotations;
                cd.super_class = super_class;
                debug!("read new classdesc: handle {handle:#x} name {}", cd.name);
                Ok(Some(r))
            }
            TC_PROXYCLASSDESC => {
                let handle = self.handles.allocate();
                let r = self
                    .arena
                    .alloc(Content::ClassDesc(ClassDesc::new(ClassDescKind::Proxy, handle)));
                self.handles.bind(handle, r)?;
                let interface_count = self.r.read_i32()?;
                if interface_count < 0 {
                    return Err(StreamError::InvalidInterfaceCount(interface_count));
                }
                let mut interfaces = Vec::with_capacity(interface_count as usize);
                for _ in 0..interface_count {
                    interfaces.push(self.r.read_utf()?);
                }
                let annotations = self.read_class_annotation()?;
                let super_class = self.read_class_desc()?;
                let cd = expect_content_mut!(self.arena, r, ClassDesc)?;
                cd.name = "(proxy class; no name)".to_owned();
                cd.interfaces = interfaces;
                cd.annotations = annotations;
                cd.super_class = super_class;
                debug!(
                    "read new proxy classdesc: handle {handle:#x} interfaces {:?}",
                    cd.interfaces
                );
                Ok(Some(r))
            }
            TC_NULL => {
                if must_be_new {
                    return Err(StreamError::Validity(
                        "expected a new class description, got null".into(),
                    ));
                }
                debug!("read null classdesc");
                Ok(None)
            }
            TC_REFERENCE => {
                if must_be_new {
                    return Err(StreamError::Validity(
                        "expected a new class description, got a reference".into(),
                    ));
                }
                let r = self.read_prev_object()?;
                expect_content!(self.arena, r, ClassDesc)?;
                Ok(Some(r))
            }
            _ => Err(StreamError::Validity(format!(
                "expected a valid class description starter, got {tc:#04x}"
            ))),
        }
    }

    fn read_field(&mut self) -> Result<Field> {
        let code = self.r.read_u8()?;
        let ty = FieldType::try_from(code).map_err(StreamError::InvalidFieldType)?;
        let name = self.r.read_utf()?;
        let class_name = match ty {
            FieldType::Object | FieldType::Array => {
                let stc = self.r.read_u8()?;
                Some(self.read_new_string(stc)?)
            }
            _ => None,
        };
        if let (FieldType::Object, Some(string)) = (ty, class_name) {
            let descriptor = &expect_content!(self.arena, string, String)?.value;
            decode_class_name(descriptor, false)?;
        }
        Ok(Field {
            ty,
            name,
            class_name,
            is_inner_class_reference: false,
        })
    }

    fn read_new_object(&mut self) -> Result<ContentRef> {
        let class_desc = self.read_class_desc()?.ok_or(StreamError::NullClassDesc)?;
        let handle = self.handles.allocate();
        let r = self.arena.alloc(Content::Instance(Instance {
            handle,
            class_desc,
            field_data: BTreeMap::new(),
            annotations: BTreeMap::new(),
            is_exception_object: false,
        }));
        self.handles.bind(handle, r)?;
        debug!("reading new object: handle {handle:#x}");
        self.read_class_data(r, class_desc)?;
        Ok(r)
    }

    /// Class chain of `class_desc`, eldest ancestor first. The walk stops
    /// with a warning at a proxy ancestor and rejects cycles.
    fn hierarchy(&self, class_desc: ContentRef) -> Result<Vec<ContentRef>> {
        let mut chain = Vec::new();
        let mut next = Some(class_desc);
        while let Some(r) = next {
            let cd = expect_content!(self.arena, r, ClassDesc)?;
            if cd.kind == ClassDescKind::Proxy && r != class_desc {
                warn!("proxy class {:#x} in superclass hierarchy", cd.handle);
                break;
            }
            if chain.contains(&r) {
                return Err(StreamError::Validity(format!(
                    "class hierarchy of {} loops back on itself",
                    cd.name
                )));
            }
            chain.push(r);
            next = cd.super_class;
        }
        chain.reverse();
        Ok(chain)
    }

    fn read_class_data(&mut self, instance: ContentRef, class_desc: ContentRef) -> Result<()> {
        for cdr in self.hierarchy(class_desc)? {
            let (flags, field_types) = {
                let cd = expect_content!(self.arena, cdr, ClassDesc)?;
                (cd.flags, cd.fields.iter().map(|f| f.ty).collect::<Vec<_>>())
            };
            if flags.contains(DescFlags::SERIALIZABLE) {
                if flags.contains(DescFlags::EXTERNALIZABLE) {
                    return Err(StreamError::IncompatibleFlags(flags));
                }
                let mut values = Vec::with_capacity(field_types.len());
                for ty in field_types {
                    values.push(self.read_field_value(ty)?);
                }
                expect_content_mut!(self.arena, instance, Instance)?
                    .field_data
                    .insert(cdr, values);
                if flags.contains(DescFlags::WRITE_METHOD) {
                    if flags.contains(DescFlags::ENUM) {
                        return Err(StreamError::IncompatibleFlags(flags));
                    }
                    let annotation = self.read_class_annotation()?;
                    expect_content_mut!(self.arena, instance, Instance)?
                        .annotations
                        .insert(cdr, annotation);
                }
            } else if flags.contains(DescFlags::EXTERNALIZABLE) {
                if !flags.contains(DescFlags::BLOCK_DATA) {
                    // Protocol version 1 external data has no framing; a
                    // reader that can't call readExternal can't get past it.
                    return Err(StreamError::OpaqueExternalData);
                }
                let annotation = self.read_class_annotation()?;
                expect_content_mut!(self.arena, instance, Instance)?
                    .annotations
                    .insert(cdr, annotation);
            }
        }
        Ok(())
    }

    fn read_field_value(&mut self, ty: FieldType) -> Result<Value> {
        Ok(match ty {
            FieldType::Byte => Value::Byte(self.r.read_i8()?),
            FieldType::Char => Value::Char(self.r.read_u16()?),
            FieldType::Double => Value::Double(self.r.read_f64()?),
            FieldType::Float => Value::Float(self.r.read_f32()?),
            FieldType::Int => Value::Int(self.r.read_i32()?),
            FieldType::Long => Value::Long(self.r.read_i64()?),
            FieldType::Short => Value::Short(self.r.read_i16()?),
            FieldType::Boolean => Value::Boolean(self.r.read_bool()?),
            FieldType::Object | FieldType::Array => {
                let tc = self.r.read_u8()?;
                if ty == FieldType::Array && !matches!(tc, TC_ARRAY | TC_NULL | TC_REFERENCE) {
                    return Err(StreamError::Validity(format!(
                        "array value must be an array, null, or reference; got {tc:#04x}"
                    )));
                }
                let content = self.read_content(tc, false)?;
                if let Some(r) = content {
                    if self.arena.is_exception_object(r) {
                        return Err(StreamError::ExceptionRead(r));
                    }
                }
                Value::Object(content)
            }
        })
    }

    /// Zero or more content items terminated by TC_ENDBLOCKDATA. A reset in
    /// this position clears the handle table and the loop continues.
    fn read_class_annotation(&mut self) -> Result<Vec<Option<ContentRef>>> {
        let mut items = Vec::new();
        loop {
            let tc = self.r.read_u8()?;
            match tc {
                TC_ENDBLOCKDATA => return Ok(items),
                TC_RESET => self.handles.reset(),
                _ => {
                    let content = self.read_content(tc, true)?;
                    if let Some(r) = content {
                        if self.arena.is_exception_object(r) {
                            return Err(StreamError::ExceptionRead(r));
                        }
                    }
                    items.push(content);
                }
            }
        }
    }

    fn read_prev_object(&mut self) -> Result<ContentRef> {
        let handle = self.r.read_i32()?;
        let r = self.handles.lookup(handle)?;
        debug!("read prev object: handle {handle:#x}");
        Ok(r)
    }

    fn read_new_class(&mut self) -> Result<ContentRef> {
        let class_desc = self.read_class_desc()?.ok_or(StreamError::NullClassDesc)?;
        let handle = self.handles.allocate();
        debug!("reading new class: handle {handle:#x}");
        let r = self
            .arena
            .alloc(Content::Class(ClassObject { handle, class_desc }));
        self.handles.bind(handle, r)?;
        Ok(r)
    }

    fn read_new_array(&mut self) -> Result<ContentRef> {
        let class_desc = self.read_class_desc()?.ok_or(StreamError::NullClassDesc)?;
        // The handle is allocated for numbering only; back-references to
        // arrays are not resolved by this reader.
        let handle = self.handles.allocate();
        let name = expect_content!(self.arena, class_desc, ClassDesc)?.name.clone();
        if name.len() < 2 || !name.starts_with('[') {
            return Err(StreamError::Validity(format!(
                "invalid name in array classdesc: {name}"
            )));
        }
        let element_type =
            FieldType::try_from(name.as_bytes()[1]).map_err(StreamError::InvalidFieldType)?;
        let size = self.r.read_i32()?;
        if size < 0 {
            return Err(StreamError::InvalidArraySize(size));
        }
        debug!("reading new array: handle {handle:#x} size {size}");
        let mut elements = Vec::new();
        for _ in 0..size {
            elements.push(self.read_field_value(element_type)?);
        }
        Ok(self.arena.alloc(Content::Array(ArrayObject {
            handle,
            class_desc,
            element_type,
            elements,
        })))
    }

    fn read_new_string(&mut self, tc: u8) -> Result<ContentRef> {
        if tc == TC_REFERENCE {
            let r = self.read_prev_object()?;
            expect_content!(self.arena, r, String)?;
            return Ok(r);
        }
        let handle = self.handles.allocate();
        let length = match tc {
            TC_STRING => self.r.read_u16()? as usize,
            TC_LONGSTRING => {
                let length = self.r.read_i64()?;
                if length < 0 || length > i32::MAX as i64 {
                    return Err(StreamError::InvalidStringLength(length));
                }
                if length < 65536 {
                    warn!("small string length encoded as TC_LONGSTRING: {length}");
                }
                length as usize
            }
            _ => return Err(StreamError::InvalidStringCode(tc)),
        };
        let data = self.r.read_bytes(length)?;
        let value = mutf8::decode(&data)?;
        debug!("reading new string: handle {handle:#x} size {}", data.len());
        let r = self.arena.alloc(Content::String(StringObject {
            handle,
            value,
            byte_length: data.len(),
        }));
        self.handles.bind(handle, r)?;
        Ok(r)
    }

    fn read_new_enum(&mut self) -> Result<ContentRef> {
        let class_desc = self.read_class_desc()?.ok_or(StreamError::NullClassDesc)?;
        let handle = self.handles.allocate();
        let tc = self.r.read_u8()?;
        let value = self.read_new_string(tc)?;
        let constant = expect_content!(self.arena, value, String)?.value.clone();
        expect_content_mut!(self.arena, class_desc, ClassDesc)?
            .enum_constants
            .push(constant);
        debug!("reading new enum: handle {handle:#x}");
        let r = self.arena.alloc(Content::Enum(EnumObject {
            handle,
            class_desc,
            value,
        }));
        self.handles.bind(handle, r)?;
        Ok(r)
    }

    /// TC_EXCEPTION at a content boundary: the writer failed mid-write and
    /// serialized the exception itself. The handle table is reset on both
    /// sides of the exception object, and the record snapshot taken here is
    /// what the top-level loop pairs with the exception.
    fn read_exception(&mut self) -> Result<ContentRef> {
        self.exception_data = Some(self.r.snapshot());
        self.handles.reset();
        let tc = self.r.read_u8()?;
        if tc == TC_RESET {
            return Err(StreamError::Validity(
                "TC_RESET while reading an exception object".into(),
            ));
        }
        let content = self.read_content(tc, false)?;
        let r = content.ok_or_else(|| {
            StreamError::Validity(
                "stream signaled for an exception, but the exception object was null".into(),
            )
        })?;
        if self.arena.is_exception_object(r) {
            return Err(StreamError::ExceptionRead(r));
        }
        expect_content_mut!(self.arena, r, Instance)?.is_exception_object = true;
        self.handles.reset();
        Ok(r)
    }

    fn read_block_data(&mut self, tc: u8) -> Result<ContentRef> {
        let size = match tc {
            TC_BLOCKDATA => self.r.read_u8()? as i32,
            TC_BLOCKDATALONG => {
                let size = self.r.read_i32()?;
                if size < 0 {
                    return Err(StreamError::InvalidBlockDataSize(size));
                }
                size
            }
            _ => return Err(StreamError::InvalidTypeCode(tc)),
        };
        let buf = self.r.read_bytes(size as usize)?;
        debug!("read blockdata of size {}", buf.len());
        Ok(self.arena.alloc(Content::BlockData(BlockData { buf })))
    }
}

#[cfg(test)]
mod parse_header_tests {
    use super::*;

    #[test]
    fn it_should_accept_the_stream_magic_and_version() {
        let stream = Parser::new(&[0xac, 0xed, 0x00, 0x05][..]).parse(true).unwrap();
        assert!(stream.contents().is_empty());
    }

    #[test]
    fn it_should_reject_a_bad_magic() {
        assert!(matches!(
            Parser::new(&[0xca, 0xfe, 0x00, 0x05][..]).parse(true),
            Err(StreamError::BadMagic(0xcafe))
        ));
    }

    #[test]
    fn it_should_reject_a_bad_version() {
        assert!(matches!(
            Parser::new(&[0xac, 0xed, 0x00, 0x04][..]).parse(true),
            Err(StreamError::BadVersion(4))
        ));
    }

    #[test]
    fn it_should_fail_on_a_truncated_header() {
        assert!(Parser::new(&[0xac][..]).parse(true).is_err());
    }
}
