use std::collections::BTreeMap;
use std::mem;

use crate::constants::BASE_WIRE_HANDLE;
use crate::content::ContentRef;
use crate::{Result, StreamError};

/// Wire handle: the 32-bit identifier assigned to stream objects in reading
/// order, referenced back by TC_REFERENCE.
pub type Handle = i32;

/// One epoch's worth of handle assignments.
pub type HandleMap = BTreeMap<Handle, ContentRef>;

/// Handle assignments for the current epoch.
///
/// A reset archives the live map and restarts allocation at the base wire
/// handle; handles are only unique within an epoch.
#[derive(Debug)]
pub struct HandleTable {
    map: HandleMap,
    archives: Vec<HandleMap>,
    next: Handle,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            archives: Vec::new(),
            next: BASE_WIRE_HANDLE,
        }
    }

    /// Next handle in reading order.
    pub fn allocate(&mut self) -> Handle {
        let handle = self.next;
        self.next += 1;
        handle
    }

    pub fn bind(&mut self, handle: Handle, content: ContentRef) -> Result<()> {
        if self.map.contains_key(&handle) {
            return Err(StreamError::HandleCollision(handle));
        }
        self.map.insert(handle, content);
        Ok(())
    }

    pub fn lookup(&self, handle: Handle) -> Result<ContentRef> {
        self.map
            .get(&handle)
            .copied()
            .ok_or(StreamError::UnboundHandle(handle))
    }

    /// Archives the live map (if it holds anything) and restarts allocation.
    pub fn reset(&mut self) {
        if !self.map.is_empty() {
            self.archives.push(mem::take(&mut self.map));
        }
        self.next = BASE_WIRE_HANDLE;
    }

    pub fn current(&self) -> &HandleMap {
        &self.map
    }

    /// Consumes the table into the historical epoch list, the final epoch
    /// last (omitted when empty).
    pub fn into_epochs(mut self) -> Vec<HandleMap> {
        if !self.map.is_empty() {
            self.archives.push(self.map);
        }
        self.archives
    }
}
