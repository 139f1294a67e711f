//! Post-parse recovery of member-class relationships.
//!
//! The wire format doesn't record that a class was an inner or static member
//! class of another; the only traces left are the `Outer$Inner` naming
//! convention and the synthetic `this$N` fields the compiler adds to inner
//! classes. This pass rebuilds the containment links from those traces,
//! following the JDK 1.1 Inner Classes Specification, and renames the
//! connected classes to their member names.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::content::{ClassDescKind, Content, ContentArena, ContentRef, FieldType};
use crate::handles::HandleMap;
use crate::names::resolve_java_type;
use crate::{expect_content, expect_content_mut, Result, StreamError};

static ENCLOSING_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^this\$\d+$").expect("enclosing-field regex compiles"));
static MEMBER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((?:[^$]+\$)*[^$]+)\$([^$]+)$").expect("member-name regex compiles"));

pub(crate) fn connect_member_classes(arena: &mut ContentArena, handles: &HandleMap) -> Result<()> {
    let mut classes: HashMap<String, ContentRef> = HashMap::new();
    let mut class_names: HashSet<String> = HashSet::new();
    for &r in handles.values() {
        if let Content::ClassDesc(cd) = &arena[r] {
            classes.insert(cd.name.clone(), r);
            class_names.insert(cd.name.clone());
        }
    }
    let mut class_refs: Vec<ContentRef> = classes.values().copied().collect();
    class_refs.sort();

    let mut new_names: BTreeMap<ContentRef, String> = BTreeMap::new();

    // Inner classes: a this$N object field must point at the enclosing type
    // named by the Outer$Inner prefix.
    for &cdr in &class_refs {
        let (cd_name, is_proxy, field_count) = {
            let cd = expect_content!(arena, cdr, ClassDesc)?;
            (cd.name.clone(), cd.kind == ClassDescKind::Proxy, cd.fields.len())
        };
        if is_proxy {
            continue;
        }
        for i in 0..field_count {
            {
                let cd = expect_content!(arena, cdr, ClassDesc)?;
                let f = &cd.fields[i];
                if f.ty != FieldType::Object || !ENCLOSING_FIELD.is_match(&f.name) {
                    continue;
                }
            }
            let caps = MEMBER_NAME.captures(&cd_name).ok_or_else(|| {
                StreamError::Validity(format!(
                    "enclosing-class reference field exists, but class name {cd_name} doesn't \
                     match the member pattern"
                ))
            })?;
            let (outer, inner) = (caps[1].to_owned(), caps[2].to_owned());
            let &outer_ref = classes.get(&outer).ok_or_else(|| {
                StreamError::Validity(format!(
                    "couldn't connect inner classes: no outer class {outer} for {cd_name}"
                ))
            })?;
            let resolved = object_field_type(arena, cdr, i)?.ok_or_else(|| {
                StreamError::Validity(format!(
                    "enclosing-class reference field of {cd_name} has no type descriptor"
                ))
            })?;
            let outer_name = expect_content!(arena, outer_ref, ClassDesc)?.name.clone();
            if outer_name != resolved {
                return Err(StreamError::Validity(format!(
                    "outer class name {outer_name} doesn't match enclosing field type {resolved}"
                )));
            }
            expect_content_mut!(arena, outer_ref, ClassDesc)?
                .inner_classes
                .push(cdr);
            {
                let cd = expect_content_mut!(arena, cdr, ClassDesc)?;
                cd.is_inner_class = true;
                // TODO: recognize local classes by the numeric prefix javac
                // puts on the member name, and set is_local_inner_class.
                cd.is_local_inner_class = false;
                cd.fields[i].is_inner_class_reference = true;
            }
            debug!("connected inner class {cd_name} to {outer}");
            new_names.insert(cdr, inner);
        }
    }

    // Static member classes: same naming convention, no enclosing-instance
    // field. An absent outer is left alone; serializing a static member class
    // doesn't require its enclosing class to appear in the stream.
    for &cdr in &class_refs {
        let (cd_name, skip) = {
            let cd = expect_content!(arena, cdr, ClassDesc)?;
            (cd.name.clone(), cd.kind == ClassDescKind::Proxy || cd.is_inner_class)
        };
        if skip {
            continue;
        }
        let Some(caps) = MEMBER_NAME.captures(&cd_name) else {
            continue;
        };
        let (outer, inner) = (caps[1].to_owned(), caps[2].to_owned());
        let Some(&outer_ref) = classes.get(&outer) else {
            continue;
        };
        expect_content_mut!(arena, outer_ref, ClassDesc)?
            .inner_classes
            .push(cdr);
        expect_content_mut!(arena, cdr, ClassDesc)?.is_static_member_class = true;
        debug!("connected static member class {cd_name} to {outer}");
        new_names.insert(cdr, inner);
    }

    // Rename commit: aborts on collision, and rewrites the type descriptor of
    // every field that referenced the old name.
    for (cdr, new_name) in new_names {
        let old_name = expect_content!(arena, cdr, ClassDesc)?.name.clone();
        if class_names.contains(&new_name) {
            return Err(StreamError::Validity(format!(
                "can't rename class {old_name} to {new_name}: a class by that name already exists"
            )));
        }
        for &other in &class_refs {
            let (is_proxy, field_count) = {
                let cd = expect_content!(arena, other, ClassDesc)?;
                (cd.kind == ClassDescKind::Proxy, cd.fields.len())
            };
            if is_proxy {
                continue;
            }
            for i in 0..field_count {
                if object_field_type(arena, other, i)?.as_deref() == Some(old_name.as_str()) {
                    rewrite_field_type(arena, other, i, &new_name)?;
                }
            }
        }
        class_names.remove(&old_name);
        expect_content_mut!(arena, cdr, ClassDesc)?.name = new_name.clone();
        debug!("renamed member class {old_name} to {new_name}");
        class_names.insert(new_name);
    }
    Ok(())
}

/// Resolved Java type of an object field, or None for other field kinds.
fn object_field_type(arena: &ContentArena, r: ContentRef, i: usize) -> Result<Option<String>> {
    let cd = expect_content!(arena, r, ClassDesc)?;
    let f = &cd.fields[i];
    if f.ty != FieldType::Object {
        return Ok(None);
    }
    let Some(string) = f.class_name else {
        return Ok(None);
    };
    let descriptor = &expect_content!(arena, string, String)?.value;
    resolve_java_type(FieldType::Object, descriptor, true, false).map(Some)
}

/// Points an object field's type descriptor at a renamed class. The
/// descriptor string is shared through its handle, so every field written
/// against it follows along.
fn rewrite_field_type(
    arena: &mut ContentArena,
    r: ContentRef,
    i: usize,
    new_name: &str,
) -> Result<()> {
    let string = expect_content!(arena, r, ClassDesc)?.fields[i]
        .class_name
        .ok_or_else(|| StreamError::Validity("object field without a type descriptor".into()))?;
    let s = expect_content_mut!(arena, string, String)?;
    s.value = format!("L{};", new_name.replace('.', "/"));
    Ok(())
}
