use std::io::Read;

use crate::content::{ClassDesc, ContentArena, ContentRef, Instance, StringObject};
use crate::handles::HandleMap;
use crate::parser::Parser;
use crate::{expect_content, Result};

/// A fully parsed serialization stream.
///
/// `contents` lists the top-level items in writing order; entries may be
/// `None`, because writing a null reference is perfectly legitimate.
/// `handle_maps` holds one handle-to-content map per reset, plus the final
/// epoch when it is non-empty.
#[derive(Debug)]
pub struct ObjectStream {
    pub(crate) arena: ContentArena,
    pub(crate) contents: Vec<Option<ContentRef>>,
    pub(crate) handle_maps: Vec<HandleMap>,
    pub(crate) final_handles: HandleMap,
}

impl ObjectStream {
    /// Parses a stream and connects member classes to their enclosing
    /// classes.
    pub fn parse(r: impl Read) -> Result<ObjectStream> {
        Parser::new(r).parse(true)
    }

    /// Parses a stream, optionally skipping the member-class pass.
    pub fn parse_with(r: impl Read, should_connect: bool) -> Result<ObjectStream> {
        Parser::new(r).parse(should_connect)
    }

    pub fn arena(&self) -> &ContentArena {
        &self.arena
    }

    pub fn contents(&self) -> &[Option<ContentRef>] {
        &self.contents
    }

    pub fn handle_maps(&self) -> &[HandleMap] {
        &self.handle_maps
    }

    /// The live handle map as of end of stream (empty if the stream ended
    /// right after a reset).
    pub fn final_handles(&self) -> &HandleMap {
        &self.final_handles
    }

    pub fn class_desc(&self, r: ContentRef) -> Result<&ClassDesc> {
        expect_content!(self.arena, r, ClassDesc)
    }

    pub fn string(&self, r: ContentRef) -> Result<&StringObject> {
        expect_content!(self.arena, r, String)
    }

    pub fn instance(&self, r: ContentRef) -> Result<&Instance> {
        expect_content!(self.arena, r, Instance)
    }
}
