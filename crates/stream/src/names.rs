//! Class-name handling: JVM field-descriptor decoding, Java-language type
//! resolution, and identifier fixup for the class printer.

use crate::content::FieldType;
use crate::{Result, StreamError};

/// Java language keywords; `fix_class_name` must never emit one of these.
const KEYWORDS: &[&str] = &[
    "abstract", "continue", "for", "new", "switch", "assert", "default", "if", "package",
    "synchronized", "boolean", "do", "goto", "private", "this", "break", "double", "implements",
    "protected", "throw", "byte", "else", "import", "public", "throws", "case", "enum",
    "instanceof", "return", "transient", "catch", "extends", "int", "short", "try", "char",
    "final", "interface", "static", "void", "class", "finally", "long", "strictfp", "volatile",
    "const", "float", "native", "super", "while",
];

/// Decodes a class name in field-descriptor format (`Lfoo/bar/Baz;`),
/// optionally converting slashes to periods.
pub fn decode_class_name(fdesc: &str, convert_slashes: bool) -> Result<String> {
    if !fdesc.starts_with('L') || !fdesc.ends_with(';') || fdesc.len() < 3 {
        return Err(StreamError::Validity(format!(
            "invalid name (not in field-descriptor format): {fdesc}"
        )));
    }
    let name = &fdesc[1..fdesc.len() - 1];
    if convert_slashes {
        Ok(name.replace('/', "."))
    } else {
        Ok(name.to_owned())
    }
}

/// Resolves a field or array element's Java-language type from its type code
/// and (for object and array kinds) its JVM type descriptor: `[I` becomes
/// `int[]`, `[[Lfoo/Bar;` becomes `foo.Bar[][]`.
pub fn resolve_java_type(
    ty: FieldType,
    class_name: &str,
    convert_slashes: bool,
    fix_names: bool,
) -> Result<String> {
    if let Some(name) = ty.primitive_name() {
        return Ok(name.to_owned());
    }
    if ty == FieldType::Object {
        return decode_class_name(class_name, convert_slashes);
    }
    let mut suffix = String::new();
    for (i, ch) in class_name.char_indices() {
        match ch {
            '[' => suffix.push_str("[]"),
            'L' => {
                let mut name = decode_class_name(&class_name[i..], convert_slashes)?;
                if fix_names {
                    name = fix_class_name(&name);
                }
                return Ok(name + &suffix);
            }
            _ => {
                if !ch.is_ascii() || ch == '\0' {
                    return Err(StreamError::Validity(format!(
                        "invalid array field type descriptor character: {class_name}"
                    )));
                }
                if i != class_name.len() - 1 {
                    return Err(StreamError::Validity(format!(
                        "array field type descriptor is too long: {class_name}"
                    )));
                }
                let element = FieldType::try_from(ch as u8)
                    .ok()
                    .and_then(FieldType::primitive_name)
                    .ok_or(StreamError::InvalidFieldType(ch as u8))?;
                let mut name = element.to_owned();
                if fix_names {
                    name = fix_class_name(&name);
                }
                return Ok(name + &suffix);
            }
        }
    }
    Err(StreamError::Validity(format!(
        "array field type descriptor is too short: {class_name}"
    )))
}

/// "Fixes" a name by transforming characters that are illegal in an
/// identifier; any modified result is prefixed with `$__` so it can't collide
/// with a keyword or an untouched name.
pub fn fix_class_name(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        return format!("$__{name}");
    }
    if name.is_empty() {
        return "$__zerolen".to_owned();
    }
    let mut out = String::with_capacity(name.len());
    let mut modified = false;
    for (i, ch) in name.chars().enumerate() {
        if i == 0 {
            if is_identifier_start(ch) {
                out.push(ch);
            } else {
                modified = true;
                if is_identifier_part(ch) {
                    out.push(ch);
                } else {
                    out.push('x');
                }
            }
        } else if is_identifier_part(ch) {
            out.push(ch);
        } else {
            modified = true;
            out.push('x');
        }
    }
    if modified {
        format!("$__{out}")
    } else {
        name.to_owned()
    }
}

// Close enough to the Java identifier predicates for names that occur in
// serialized streams.
fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Escapes double quotes, backslashes, and non-printable-ASCII characters for
/// use in a string literal.
pub fn unicode_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut units = [0u16; 2];
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
            out.push(ch);
        } else if (ch as u32) < 0x20 || (ch as u32) > 0x7f {
            for &unit in ch.encode_utf16(&mut units).iter() {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod names_tests {
    use super::*;

    #[test]
    fn it_should_decode_a_field_descriptor() {
        assert_eq!(
            "java.lang.String",
            decode_class_name("Ljava/lang/String;", true).unwrap()
        );
        assert_eq!(
            "java/lang/String",
            decode_class_name("Ljava/lang/String;", false).unwrap()
        );
    }

    #[test]
    fn it_should_reject_a_malformed_field_descriptor() {
        assert!(decode_class_name("java/lang/String", true).is_err());
        assert!(decode_class_name("Ljava/lang/String", true).is_err());
        assert!(decode_class_name("L;", true).is_err());
    }

    #[test]
    fn it_should_resolve_primitive_array_types() {
        assert_eq!(
            "int[]",
            resolve_java_type(FieldType::Array, "[I", true, false).unwrap()
        );
        assert_eq!(
            "boolean[][]",
            resolve_java_type(FieldType::Array, "[[Z", true, false).unwrap()
        );
    }

    #[test]
    fn it_should_resolve_object_array_types() {
        assert_eq!(
            "foo.Bar[][]",
            resolve_java_type(FieldType::Array, "[[Lfoo/Bar;", true, false).unwrap()
        );
    }

    #[test]
    fn it_should_reject_a_trailing_garbage_array_descriptor() {
        assert!(resolve_java_type(FieldType::Array, "[II", true, false).is_err());
        assert!(resolve_java_type(FieldType::Array, "[", true, false).is_err());
    }

    #[test]
    fn it_should_fix_keywords_and_illegal_characters() {
        assert_eq!("$__int", fix_class_name("int"));
        assert_eq!("$__axb", fix_class_name("a-b"));
        assert_eq!("Plain", fix_class_name("Plain"));
        assert_eq!("$__zerolen", fix_class_name(""));
        assert_eq!("$__9abc", fix_class_name("9abc"));
    }

    #[test]
    fn it_should_escape_string_literals() {
        assert_eq!("say \\\"hi\\\"", unicode_escape("say \"hi\""));
        assert_eq!("\\u00e9", unicode_escape("\u{e9}"));
        assert_eq!("\\ud801\\udc00", unicode_escape("\u{10400}"));
    }
}
