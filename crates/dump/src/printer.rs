//! Output stages for the command-line tool: block-data extraction, the
//! content listing, class declarations, and instance dumps. Everything here
//! reads the parsed model; nothing mutates it.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use log::warn;
use regex::Regex;

use joss_stream::{
    fix_class_name, resolve_java_type, unicode_escape, ClassDescKind, Content, ContentRef,
    DescFlags, Field, FieldType, Handle, ObjectStream, Value,
};

use crate::options::ParsedOptions;

const INDENT: &str = "    ";
const CODE_WIDTH: usize = 90;

pub struct DumpConfig {
    show_content: bool,
    show_classes: bool,
    show_instances: bool,
    show_arrays: bool,
    fix_names: bool,
    filter: Option<Regex>,
    filter_pattern: Option<String>,
    block_data_path: Option<String>,
    manifest_path: Option<String>,
}

impl DumpConfig {
    pub fn from_options(opts: &ParsedOptions) -> Result<Self, regex::Error> {
        let filter_pattern = opts.first_argument("filter").map(str::to_owned);
        let filter = match &filter_pattern {
            // full-string match on the class name
            Some(pattern) => Some(Regex::new(&format!("^(?:{pattern})$"))?),
            None => None,
        };
        Ok(Self {
            show_content: !opts.has("nocontent"),
            show_classes: !opts.has("noclasses"),
            show_instances: !opts.has("noinstances"),
            show_arrays: opts.has("showarrays"),
            fix_names: opts.has("fixnames"),
            filter,
            filter_pattern,
            block_data_path: opts.first_argument("blockdata").map(str::to_owned),
            manifest_path: opts.first_argument("blockdatamanifest").map(str::to_owned),
        })
    }
}

pub fn dump(stream: &ObjectStream, config: &DumpConfig) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    extract_block_data(stream, config)?;
    if config.show_content {
        dump_contents(stream, &mut out)?;
    }
    if config.show_classes {
        dump_classes(stream, config, &mut out)?;
    }
    if config.show_instances {
        dump_instances(stream, &mut out)?;
    }
    Ok(())
}

fn extract_block_data(stream: &ObjectStream, config: &DumpConfig) -> io::Result<()> {
    if config.block_data_path.is_none() && config.manifest_path.is_none() {
        return Ok(());
    }
    let mut data_out = match &config.block_data_path {
        Some(path) => Some(File::create(path)?),
        None => None,
    };
    let mut manifest_out = match &config.manifest_path {
        Some(path) => {
            let mut w = BufWriter::new(File::create(path)?);
            writeln!(
                w,
                "# Each line in this file that doesn't begin with a '#' contains the size of"
            )?;
            writeln!(w, "# an individual blockdata block written to the stream.")?;
            Some(w)
        }
        None => None,
    };
    for item in stream.contents() {
        let Some(r) = item else { continue };
        if let Content::BlockData(bd) = &stream.arena()[*r] {
            if let Some(w) = &mut manifest_out {
                writeln!(w, "{}", bd.buf.len())?;
            }
            if let Some(f) = &mut data_out {
                f.write_all(&bd.buf)?;
            }
        }
    }
    Ok(())
}

fn dump_contents<W: Write>(stream: &ObjectStream, out: &mut W) -> io::Result<()> {
    writeln!(out, "//// BEGIN stream content output")?;
    for item in stream.contents() {
        writeln!(out, "{}", render_content(stream, *item))?;
    }
    writeln!(out, "//// END stream content output")?;
    writeln!(out)
}

fn dump_classes<W: Write>(
    stream: &ObjectStream,
    config: &DumpConfig,
    out: &mut W,
) -> io::Result<()> {
    writeln!(
        out,
        "//// BEGIN class declarations{}{}",
        if config.show_arrays {
            ""
        } else {
            " (excluding array classes)"
        },
        config
            .filter_pattern
            .as_ref()
            .map(|pattern| format!(" (exclusion filter {pattern})"))
            .unwrap_or_default()
    )?;
    for &r in stream.final_handles().values() {
        let Content::ClassDesc(cd) = &stream.arena()[r] else {
            continue;
        };
        if !config.show_arrays && cd.is_array_class() {
            continue;
        }
        // Member classes are printed as part of their enclosing classes.
        if cd.is_static_member_class || cd.is_inner_class {
            continue;
        }
        if let Some(filter) = &config.filter {
            if filter.is_match(&cd.name) {
                continue;
            }
        }
        dump_class_desc(stream, r, 0, config.fix_names, out)?;
        writeln!(out)?;
    }
    writeln!(out, "//// END class declarations")?;
    writeln!(out)
}

fn dump_class_desc<W: Write>(
    stream: &ObjectStream,
    r: ContentRef,
    level: usize,
    fix: bool,
    out: &mut W,
) -> io::Result<()> {
    let arena = stream.arena();
    let Content::ClassDesc(cd) = &arena[r] else {
        return Ok(());
    };
    if !cd.annotations.is_empty() {
        writeln!(out, "{}// annotations:", indent(level))?;
        for item in &cd.annotations {
            writeln!(
                out,
                "{}// {}{}",
                indent(level),
                INDENT,
                render_content(stream, *item)
            )?;
        }
    }
    match cd.kind {
        ClassDescKind::Normal => {
            let class_name = if fix {
                fix_class_name(&cd.name)
            } else {
                cd.name.clone()
            };
            if cd.flags.contains(DescFlags::ENUM) {
                write!(out, "{}enum {} {{", indent(level), class_name)?;
                let mut should_indent = true;
                let mut width = indent(level + 1).len();
                for constant in &cd.enum_constants {
                    if should_indent {
                        writeln!(out)?;
                        write!(out, "{}", indent(level + 1))?;
                        should_indent = false;
                    }
                    width += constant.len();
                    write!(out, "{constant}, ")?;
                    if width >= CODE_WIDTH {
                        width = indent(level + 1).len();
                        should_indent = true;
                    }
                }
                writeln!(out)?;
                writeln!(out, "{}}}", indent(level))?;
                return Ok(());
            }
            write!(out, "{}", indent(level))?;
            if cd.is_static_member_class {
                write!(out, "static ")?;
            }
            let declared = if cd.is_array_class() {
                resolve_java_type(FieldType::Array, &cd.name, false, fix).unwrap_or_else(|e| {
                    warn!("can't resolve array class name {}: {e}", cd.name);
                    cd.name.clone()
                })
            } else {
                class_name
            };
            write!(out, "class {declared}")?;
            if let Some(super_ref) = cd.super_class {
                if let Content::ClassDesc(super_cd) = &arena[super_ref] {
                    write!(out, " extends {}", super_cd.name)?;
                }
            }
            write!(
                out,
                " implements {}",
                if cd.flags.contains(DescFlags::EXTERNALIZABLE) {
                    "java.io.Externalizable"
                } else {
                    "java.io.Serializable"
                }
            )?;
            for interface in &cd.interfaces {
                write!(out, ", {interface}")?;
            }
            writeln!(out, " {{")?;
            for f in &cd.fields {
                if f.is_inner_class_reference {
                    continue;
                }
                writeln!(
                    out,
                    "{}{} {};",
                    indent(level + 1),
                    field_java_type(stream, f, fix),
                    f.name
                )?;
            }
            for &inner in &cd.inner_classes {
                dump_class_desc(stream, inner, level + 1, fix, out)?;
            }
            writeln!(out, "{}}}", indent(level))?;
        }
        ClassDescKind::Proxy => {
            write!(out, "{}// proxy class {:#x}", indent(level), cd.handle)?;
            if let Some(super_ref) = cd.super_class {
                if let Content::ClassDesc(super_cd) = &arena[super_ref] {
                    write!(out, " extends {}", super_cd.name)?;
                }
            }
            writeln!(out, " implements")?;
            for interface in &cd.interfaces {
                writeln!(out, "{}//    {},", indent(level), interface)?;
            }
            writeln!(
                out,
                "{}//    {}",
                indent(level),
                if cd.flags.contains(DescFlags::EXTERNALIZABLE) {
                    "java.io.Externalizable"
                } else {
                    "java.io.Serializable"
                }
            )?;
        }
    }
    Ok(())
}

fn dump_instances<W: Write>(stream: &ObjectStream, out: &mut W) -> io::Result<()> {
    writeln!(out, "//// BEGIN instance dump")?;
    for &r in stream.final_handles().values() {
        if matches!(&stream.arena()[r], Content::Instance(_)) {
            dump_instance(stream, r, out)?;
        }
    }
    writeln!(out, "//// END instance dump")?;
    writeln!(out)
}

fn dump_instance<W: Write>(stream: &ObjectStream, r: ContentRef, out: &mut W) -> io::Result<()> {
    let arena = stream.arena();
    let Content::Instance(instance) = &arena[r] else {
        return Ok(());
    };
    let (cd_handle, cd_name) = match &arena[instance.class_desc] {
        Content::ClassDesc(cd) => (cd.handle, cd.name.as_str()),
        _ => (0, "?"),
    };
    write!(
        out,
        "[instance {:#x}: {:#x}/{}",
        instance.handle, cd_handle, cd_name
    )?;
    if !instance.annotations.is_empty() {
        writeln!(out)?;
        writeln!(out, "  object annotations:")?;
        for (cd_ref, items) in &instance.annotations {
            writeln!(out, "    {}", class_name_of(stream, *cd_ref))?;
            for item in items {
                writeln!(out, "        {}", render_content(stream, *item))?;
            }
        }
    }
    if !instance.field_data.is_empty() {
        writeln!(out)?;
        writeln!(out, "  field data:")?;
        for (cd_ref, values) in &instance.field_data {
            let Content::ClassDesc(cd) = &arena[*cd_ref] else {
                continue;
            };
            writeln!(out, "    {:#x}/{}:", cd.handle, cd.name)?;
            for (f, value) in cd.fields.iter().zip(values) {
                writeln!(
                    out,
                    "        {}: {}",
                    f.name,
                    render_value(stream, value, instance.handle)
                )?;
            }
        }
    }
    writeln!(out, "]")
}

fn indent(level: usize) -> String {
    INDENT.repeat(level)
}

fn class_name_of(stream: &ObjectStream, r: ContentRef) -> String {
    match &stream.arena()[r] {
        Content::ClassDesc(cd) => cd.name.clone(),
        _ => "?".to_owned(),
    }
}

fn string_value(stream: &ObjectStream, r: ContentRef) -> String {
    match &stream.arena()[r] {
        Content::String(s) => s.value.clone(),
        _ => "?".to_owned(),
    }
}

fn field_java_type(stream: &ObjectStream, f: &Field, fix: bool) -> String {
    let class_name = f
        .class_name
        .map(|r| string_value(stream, r))
        .unwrap_or_default();
    match resolve_java_type(f.ty, &class_name, true, fix) {
        Ok(name) => name,
        Err(e) => {
            warn!("can't resolve type of field {}: {e}", f.name);
            "?".to_owned()
        }
    }
}

fn render_content(stream: &ObjectStream, item: Option<ContentRef>) -> String {
    let Some(r) = item else {
        return "null".to_owned();
    };
    let arena = stream.arena();
    match &arena[r] {
        Content::String(s) => {
            format!("[String {:#x}: \"{}\"]", s.handle, unicode_escape(&s.value))
        }
        Content::ClassDesc(cd) => format!(
            "[classdesc {:#x}: name {} uid {}]",
            cd.handle, cd.name, cd.serial_version_uid
        ),
        Content::Class(c) => format!(
            "[class {:#x}: {}]",
            c.handle,
            render_content(stream, Some(c.class_desc))
        ),
        Content::Enum(e) => format!("[enum {:#x}: {}]", e.handle, string_value(stream, e.value)),
        Content::Array(a) => {
            let elements: Vec<String> = a
                .elements
                .iter()
                .map(|v| render_value(stream, v, a.handle))
                .collect();
            format!(
                "[array {:#x} size {}: {}]",
                a.handle,
                a.elements.len(),
                elements.join(", ")
            )
        }
        Content::Instance(i) => {
            let (cd_handle, cd_name) = match &arena[i.class_desc] {
                Content::ClassDesc(cd) => (cd.handle, cd.name.as_str()),
                _ => (0, "?"),
            };
            format!("[instance {:#x}: {:#x}/{}]", i.handle, cd_handle, cd_name)
        }
        Content::BlockData(bd) => format!("[blockdata: {} bytes]", bd.buf.len()),
        Content::ExceptionState(es) => {
            let mut s = format!(
                "[ExceptionState {} length {}",
                render_content(stream, Some(es.exception)),
                es.data.len()
            );
            for (i, byte) in es.data.iter().enumerate() {
                if i % 16 == 0 {
                    s.push_str(&format!("\n{i:7x}: "));
                }
                s.push_str(&format!(" {byte:02x}"));
            }
            if !es.data.is_empty() {
                s.push('\n');
            }
            s.push(']');
            s
        }
    }
}

fn render_value(stream: &ObjectStream, value: &Value, enclosing: Handle) -> String {
    match value {
        Value::Byte(v) => v.to_string(),
        Value::Char(c) => char::from_u32(*c as u32)
            .map(String::from)
            .unwrap_or_else(|| format!("\\u{c:04x}")),
        Value::Double(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Short(v) => v.to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Object(None) => "null".to_owned(),
        Value::Object(Some(r)) => match stream.arena()[*r].handle() {
            Some(handle) if handle == enclosing => "this".to_owned(),
            Some(handle) => format!("r{:#x}: {}", handle, render_content(stream, Some(*r))),
            None => render_content(stream, Some(*r)),
        },
    }
}
