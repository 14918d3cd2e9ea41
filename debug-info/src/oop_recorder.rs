use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;

use installer_common::ids::{Metadata, ObjectHandle};

/// Indices handed out by identity. Index 0 is reserved for null.
#[derive(Clone, Debug)]
struct IndexTable<T> {
    values: Vec<T>,
    indices: HashMap<T, usize>,
}

impl<T: Copy + Eq + Hash> IndexTable<T> {
    fn new() -> Self {
        Self { values: vec![], indices: HashMap::new() }
    }

    fn find_index(&mut self, value: T) -> (usize, bool) {
        if let Some(index) = self.indices.get(&value) {
            return (*index, false);
        }
        self.values.push(value);
        let index = self.values.len();
        self.indices.insert(value, index);
        (index, true)
    }
}

/// The metadata and heap objects an installed method refers to.
#[derive(Clone, Debug)]
pub struct OopRecorder {
    metadata: IndexTable<Metadata>,
    oops: IndexTable<ObjectHandle>,
}

impl Default for OopRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl OopRecorder {
    pub fn new() -> Self {
        Self { metadata: IndexTable::new(), oops: IndexTable::new() }
    }

    pub fn find_metadata_index(&mut self, metadata: Metadata) -> usize {
        let (index, new) = self.metadata.find_index(metadata);
        if new {
            trace!(index, address = metadata.address(), "recorded metadata");
        }
        index
    }

    pub fn find_oop_index(&mut self, oop: ObjectHandle) -> usize {
        let (index, new) = self.oops.find_index(oop);
        if new {
            trace!(index, handle = oop.0, "recorded oop");
        }
        index
    }

    pub fn metadata(&self) -> &[Metadata] {
        self.metadata.values.as_slice()
    }

    pub fn oops(&self) -> &[ObjectHandle] {
        self.oops.values.as_slice()
    }
}
