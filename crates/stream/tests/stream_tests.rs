use joss_stream::constants::{
    BASE_WIRE_HANDLE, TC_ARRAY, TC_BLOCKDATA, TC_BLOCKDATALONG, TC_CLASSDESC, TC_ENDBLOCKDATA,
    TC_ENUM, TC_EXCEPTION, TC_LONGSTRING, TC_NULL, TC_OBJECT, TC_PROXYCLASSDESC, TC_REFERENCE,
    TC_RESET, TC_STRING,
};
use joss_stream::{
    ClassDescKind, Content, DescFlags, FieldType, ObjectStream, StreamError, Value,
};

/// Assembles a protocol byte stream, starting from the magic and version.
struct StreamBuilder {
    buf: Vec<u8>,
}

impl StreamBuilder {
    fn new() -> Self {
        Self {
            buf: vec![0xac, 0xed, 0x00, 0x05],
        }
    }

    fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn i32(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn i64(mut self, v: i64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    fn bytes(mut self, v: &[u8]) -> Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// u16-length-prefixed string (tests use ASCII names only).
    fn utf(mut self, s: &str) -> Self {
        self = self.u16(s.len() as u16);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    fn build(self) -> Vec<u8> {
        self.buf
    }
}

#[test]
fn test_primitive_and_string_fields() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Blob")
        .i64(42)
        .u8(0x02) // SC_SERIALIZABLE
        .u16(2)
        .u8(b'I')
        .utf("a")
        .u8(b'L')
        .utf("b")
        .u8(TC_STRING)
        .utf("Ljava/lang/String;")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .i32(42)
        .u8(TC_STRING)
        .utf("zoo")
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    assert_eq!(1, stream.contents().len());
    let instance = stream.instance(stream.contents()[0].unwrap()).unwrap();
    assert_eq!(BASE_WIRE_HANDLE + 2, instance.handle);

    let cd = stream.class_desc(instance.class_desc).unwrap();
    assert_eq!("Blob", cd.name);
    assert_eq!(42, cd.serial_version_uid);
    assert_eq!(2, cd.fields.len());
    assert_eq!(FieldType::Int, cd.fields[0].ty);
    assert_eq!("a", cd.fields[0].name);
    assert_eq!(FieldType::Object, cd.fields[1].ty);
    assert_eq!("b", cd.fields[1].name);

    let values = &instance.field_data[&instance.class_desc];
    assert_eq!(Value::Int(42), values[0]);
    let Value::Object(Some(s)) = &values[1] else {
        panic!("expected a string value");
    };
    assert_eq!("zoo", stream.string(*s).unwrap().value);
    assert_eq!(3, stream.string(*s).unwrap().byte_length);
}

#[test]
fn test_handle_reuse_between_top_level_items() {
    let bytes = StreamBuilder::new()
        .u8(TC_STRING)
        .utf("zoo")
        .u8(TC_REFERENCE)
        .i32(BASE_WIRE_HANDLE)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    assert_eq!(2, stream.contents().len());
    assert_eq!(stream.contents()[0], stream.contents()[1]);
    let s = stream.string(stream.contents()[0].unwrap()).unwrap();
    assert_eq!("zoo", s.value);
    assert_eq!(BASE_WIRE_HANDLE, s.handle);
}

#[test]
fn test_inner_class_connection_and_rename() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer$Inner")
        .i64(1)
        .u8(0x02)
        .u16(1)
        .u8(b'L')
        .utf("this$0")
        .u8(TC_STRING)
        .utf("LOuter;")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        // this$0 holds an Outer instance
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer")
        .i64(2)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let instance = stream.instance(stream.contents()[0].unwrap()).unwrap();
    let inner_cd = stream.class_desc(instance.class_desc).unwrap();
    assert_eq!("Inner", inner_cd.name);
    assert!(inner_cd.is_inner_class);
    assert!(!inner_cd.is_static_member_class);
    assert!(inner_cd.fields[0].is_inner_class_reference);

    let Value::Object(Some(outer_instance)) = &instance.field_data[&instance.class_desc][0] else {
        panic!("expected the enclosing instance");
    };
    let outer_cd_ref = stream.instance(*outer_instance).unwrap().class_desc;
    let outer_cd = stream.class_desc(outer_cd_ref).unwrap();
    assert_eq!("Outer", outer_cd.name);
    assert_eq!(vec![instance.class_desc], outer_cd.inner_classes);
}

#[test]
fn test_member_names_untouched_without_connect() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer$Inner")
        .i64(1)
        .u8(0x02)
        .u16(1)
        .u8(b'L')
        .utf("this$0")
        .u8(TC_STRING)
        .utf("LOuter;")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer")
        .i64(2)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    let stream = ObjectStream::parse_with(&bytes[..], false).unwrap();

    let instance = stream.instance(stream.contents()[0].unwrap()).unwrap();
    let cd = stream.class_desc(instance.class_desc).unwrap();
    assert_eq!("Outer$Inner", cd.name);
    assert!(!cd.is_inner_class);
    assert!(!cd.fields[0].is_inner_class_reference);
}

#[test]
fn test_static_member_class_connection() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer$Nested")
        .i64(1)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer")
        .i64(2)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let nested_cd_ref = stream.instance(stream.contents()[0].unwrap()).unwrap().class_desc;
    let nested = stream.class_desc(nested_cd_ref).unwrap();
    assert_eq!("Nested", nested.name);
    assert!(nested.is_static_member_class);
    assert!(!nested.is_inner_class);

    let outer_cd_ref = stream.instance(stream.contents()[1].unwrap()).unwrap().class_desc;
    let outer = stream.class_desc(outer_cd_ref).unwrap();
    assert_eq!(vec![nested_cd_ref], outer.inner_classes);
}

#[test]
fn test_member_class_without_outer_is_left_alone() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Gone$Nested")
        .i64(1)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let cd_ref = stream.instance(stream.contents()[0].unwrap()).unwrap().class_desc;
    let cd = stream.class_desc(cd_ref).unwrap();
    assert_eq!("Gone$Nested", cd.name);
    assert!(!cd.is_static_member_class);
}

#[test]
fn test_rename_collision_aborts_connection() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer$Inner")
        .i64(1)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Outer")
        .i64(2)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Inner")
        .i64(3)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::Validity(_))
    ));
}

#[test]
fn test_enum_constant() {
    let bytes = StreamBuilder::new()
        .u8(TC_ENUM)
        .u8(TC_CLASSDESC)
        .utf("Color")
        .i64(0)
        .u8(0x12) // SC_SERIALIZABLE | SC_ENUM
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_CLASSDESC)
        .utf("java.lang.Enum")
        .i64(0)
        .u8(0x12)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .u8(TC_STRING)
        .utf("RED")
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let Content::Enum(e) = &stream.arena()[stream.contents()[0].unwrap()] else {
        panic!("expected an enum");
    };
    assert_eq!(BASE_WIRE_HANDLE + 2, e.handle);
    let cd = stream.class_desc(e.class_desc).unwrap();
    assert!(cd.flags.contains(DescFlags::ENUM));
    assert_eq!(vec!["RED".to_owned()], cd.enum_constants);
    assert_eq!("RED", stream.string(e.value).unwrap().value);
    // the enum itself is referenceable
    let last = stream.handle_maps().last().unwrap();
    assert_eq!(Some(&stream.contents()[0].unwrap()), last.get(&e.handle));
}

#[test]
fn test_write_method_annotation() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Custom")
        .i64(7)
        .u8(0x03) // SC_SERIALIZABLE | SC_WRITE_METHOD
        .u16(1)
        .u8(b'I')
        .utf("x")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .i32(5)
        .u8(TC_BLOCKDATA)
        .u8(4)
        .bytes(&[0, 0, 0, 42])
        .u8(TC_ENDBLOCKDATA)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let instance = stream.instance(stream.contents()[0].unwrap()).unwrap();
    assert_eq!(Value::Int(5), instance.field_data[&instance.class_desc][0]);
    let annotation = &instance.annotations[&instance.class_desc];
    assert_eq!(1, annotation.len());
    let Content::BlockData(bd) = &stream.arena()[annotation[0].unwrap()] else {
        panic!("expected block data");
    };
    assert_eq!(vec![0, 0, 0, 42], bd.buf);
}

#[test]
fn test_embedded_exception() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Foo")
        .i64(1)
        .u8(0x03)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .u8(TC_BLOCKDATA)
        .u8(2)
        .bytes(&[1, 2])
        .u8(TC_EXCEPTION)
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("java.io.IOException")
        .i64(9)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    assert_eq!(1, stream.contents().len());
    let Content::ExceptionState(es) = &stream.arena()[stream.contents()[0].unwrap()] else {
        panic!("expected an exception state");
    };
    let exception = stream.instance(es.exception).unwrap();
    assert!(exception.is_exception_object);
    assert_eq!(
        "java.io.IOException",
        stream.class_desc(exception.class_desc).unwrap().name
    );
    assert_eq!(es.handle, exception.handle);
    // the exception epoch restarted at the base handle
    assert_eq!(BASE_WIRE_HANDLE + 1, exception.handle);

    // recorded bytes span from the start of the failing item through the
    // TC_EXCEPTION byte: TC_OBJECT + classdesc "Foo" + null super + blockdata
    assert_eq!(TC_EXCEPTION, *es.data.last().unwrap());
    assert_eq!(&bytes[4..4 + es.data.len()], &es.data[..]);
    assert_eq!(25, es.data.len());

    // one archived epoch per reset; the final epoch is empty
    assert_eq!(2, stream.handle_maps().len());
    assert!(stream.final_handles().is_empty());
}

#[test]
fn test_reset_archives_an_epoch() {
    let bytes = StreamBuilder::new()
        .u8(TC_STRING)
        .utf("a")
        .u8(TC_RESET)
        .u8(TC_STRING)
        .utf("b")
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let b = stream.string(stream.contents()[1].unwrap()).unwrap();
    assert_eq!("b", b.value);
    assert_eq!(BASE_WIRE_HANDLE, b.handle);
    assert_eq!(2, stream.handle_maps().len());
}

#[test]
fn test_top_level_block_data() {
    let bytes = StreamBuilder::new()
        .u8(TC_BLOCKDATA)
        .u8(3)
        .bytes(&[1, 2, 3])
        .u8(TC_BLOCKDATALONG)
        .i32(2)
        .bytes(&[4, 5])
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let Content::BlockData(short) = &stream.arena()[stream.contents()[0].unwrap()] else {
        panic!("expected block data");
    };
    assert_eq!(vec![1, 2, 3], short.buf);
    let Content::BlockData(long) = &stream.arena()[stream.contents()[1].unwrap()] else {
        panic!("expected block data");
    };
    assert_eq!(vec![4, 5], long.buf);
}

#[test]
fn test_long_string_with_small_length_is_tolerated() {
    let bytes = StreamBuilder::new()
        .u8(TC_LONGSTRING)
        .i64(3)
        .bytes(b"zoo")
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();
    assert_eq!(
        "zoo",
        stream.string(stream.contents()[0].unwrap()).unwrap().value
    );
}

#[test]
fn test_long_string_with_negative_length_is_rejected() {
    let bytes = StreamBuilder::new().u8(TC_LONGSTRING).i64(-1).build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::InvalidStringLength(-1))
    ));
}

#[test]
fn test_primitive_array() {
    let bytes = StreamBuilder::new()
        .u8(TC_ARRAY)
        .u8(TC_CLASSDESC)
        .utf("[I")
        .i64(0)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .i32(3)
        .i32(1)
        .i32(2)
        .i32(3)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let Content::Array(a) = &stream.arena()[stream.contents()[0].unwrap()] else {
        panic!("expected an array");
    };
    assert_eq!(FieldType::Int, a.element_type);
    assert_eq!(vec![Value::Int(1), Value::Int(2), Value::Int(3)], a.elements);
}

#[test]
fn test_object_array_with_null_element() {
    let bytes = StreamBuilder::new()
        .u8(TC_ARRAY)
        .u8(TC_CLASSDESC)
        .utf("[Ljava.lang.String;")
        .i64(0)
        .u8(0x02)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .i32(2)
        .u8(TC_STRING)
        .utf("x")
        .u8(TC_NULL)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let Content::Array(a) = &stream.arena()[stream.contents()[0].unwrap()] else {
        panic!("expected an array");
    };
    assert_eq!(FieldType::Object, a.element_type);
    let Value::Object(Some(s)) = &a.elements[0] else {
        panic!("expected a string element");
    };
    assert_eq!("x", stream.string(*s).unwrap().value);
    assert_eq!(Value::Object(None), a.elements[1]);
}

#[test]
fn test_field_values_are_read_eldest_ancestor_first() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Child")
        .i64(2)
        .u8(0x02)
        .u16(1)
        .u8(b'I')
        .utf("c")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_CLASSDESC)
        .utf("Parent")
        .i64(1)
        .u8(0x02)
        .u16(1)
        .u8(b'I')
        .utf("p")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .i32(1) // Parent.p
        .i32(2) // Child.c
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let instance = stream.instance(stream.contents()[0].unwrap()).unwrap();
    assert_eq!(2, instance.field_data.len());
    let child_ref = instance.class_desc;
    let parent_ref = stream.class_desc(child_ref).unwrap().super_class.unwrap();
    assert_eq!(Value::Int(1), instance.field_data[&parent_ref][0]);
    assert_eq!(Value::Int(2), instance.field_data[&child_ref][0]);
}

#[test]
fn test_non_serializable_ancestor_contributes_no_field_data() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Child")
        .i64(2)
        .u8(0x02)
        .u16(1)
        .u8(b'I')
        .utf("c")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_CLASSDESC)
        .utf("Parent")
        .i64(1)
        .u8(0x00)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .i32(2)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let instance = stream.instance(stream.contents()[0].unwrap()).unwrap();
    assert_eq!(1, instance.field_data.len());
    assert_eq!(Value::Int(2), instance.field_data[&instance.class_desc][0]);
}

#[test]
fn test_externalizable_block_data() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Ext")
        .i64(1)
        .u8(0x0c) // SC_EXTERNALIZABLE | SC_BLOCK_DATA
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .u8(TC_BLOCKDATA)
        .u8(1)
        .bytes(&[7])
        .u8(TC_ENDBLOCKDATA)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let instance = stream.instance(stream.contents()[0].unwrap()).unwrap();
    assert!(instance.field_data.is_empty());
    assert_eq!(1, instance.annotations[&instance.class_desc].len());
}

#[test]
fn test_externalizable_without_block_data_is_opaque() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Ext")
        .i64(1)
        .u8(0x04) // SC_EXTERNALIZABLE only
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::OpaqueExternalData)
    ));
}

#[test]
fn test_serializable_and_externalizable_together_are_rejected() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Both")
        .i64(1)
        .u8(0x06)
        .u16(0)
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::IncompatibleFlags(_))
    ));
}

#[test]
fn test_proxy_class_description() {
    let bytes = StreamBuilder::new()
        .u8(TC_PROXYCLASSDESC)
        .i32(2)
        .utf("com.example.IFoo")
        .utf("com.example.IBar")
        .u8(TC_ENDBLOCKDATA)
        .u8(TC_NULL)
        .build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();

    let cd = stream.class_desc(stream.contents()[0].unwrap()).unwrap();
    assert_eq!(ClassDescKind::Proxy, cd.kind);
    assert_eq!("(proxy class; no name)", cd.name);
    assert_eq!(
        vec!["com.example.IFoo".to_owned(), "com.example.IBar".to_owned()],
        cd.interfaces
    );
    assert!(cd.fields.is_empty());
}

#[test]
fn test_null_top_level_item() {
    let bytes = StreamBuilder::new().u8(TC_NULL).build();
    let stream = ObjectStream::parse(&bytes[..]).unwrap();
    assert_eq!(vec![None], stream.contents().to_vec());
}

#[test]
fn test_dangling_back_reference_is_rejected() {
    let bytes = StreamBuilder::new()
        .u8(TC_REFERENCE)
        .i32(BASE_WIRE_HANDLE)
        .build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::UnboundHandle(BASE_WIRE_HANDLE))
    ));
}

#[test]
fn test_reference_to_the_wrong_variant_is_rejected() {
    let bytes = StreamBuilder::new()
        .u8(TC_STRING)
        .utf("zoo")
        .u8(TC_OBJECT)
        .u8(TC_REFERENCE)
        .i32(BASE_WIRE_HANDLE)
        .build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::UnexpectedContent("ClassDesc", "String"))
    ));
}

#[test]
fn test_unknown_type_code_is_rejected() {
    let bytes = StreamBuilder::new().u8(0x10).build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::InvalidTypeCode(0x10))
    ));
}

#[test]
fn test_negative_field_count_is_rejected() {
    let bytes = StreamBuilder::new()
        .u8(TC_OBJECT)
        .u8(TC_CLASSDESC)
        .utf("Bad")
        .i64(1)
        .u8(0x02)
        .u16(0xffff) // -1 as i16
        .build();
    assert!(matches!(
        ObjectStream::parse(&bytes[..]),
        Err(StreamError::InvalidFieldCount(-1))
    ));
}
