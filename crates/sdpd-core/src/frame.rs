//! Byte-budgeted response body buffer
//!
//! Handlers build the body of one response frame here. The buffer never grows
//! past its budget; writers check `remaining()` before committing a full
//! attribute and fall back to a partial encode otherwise.

use crate::codec::{encode, encode_partial, encoded_len};
use crate::record::Attribute;

/// Scratch buffer for one frame's worth of response body
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
    budget: usize,
}

impl FrameBuffer {
    /// Allocate a fresh buffer for a frame of at most `budget` bytes
    pub fn new(budget: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(budget),
            budget,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes still available in this frame
    pub fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.bytes.len())
    }

    /// Reserve `len` zeroed bytes to be backpatched later, returning their position
    pub fn reserve(&mut self, len: usize) -> usize {
        let at = self.bytes.len();
        self.bytes.resize(at + len, 0);
        at
    }

    /// Overwrite previously reserved bytes
    pub fn backpatch(&mut self, at: usize, value: &[u8]) {
        self.bytes[at..at + value.len()].copy_from_slice(value);
    }

    /// Drop everything written from `at` onwards
    pub fn truncate(&mut self, at: usize) {
        self.bytes.truncate(at);
    }

    /// Append an attribute entry in full; the caller has checked it fits
    pub fn push_attribute(&mut self, attribute: &Attribute) {
        debug_assert!(encoded_len(attribute) <= self.remaining());
        encode(attribute, &mut self.bytes);
    }

    /// Append as much of an attribute entry as fits, starting at `*offset`
    pub fn push_partial_attribute(&mut self, attribute: &Attribute, offset: &mut usize) -> usize {
        let budget = self.remaining();
        encode_partial(attribute, budget, offset, &mut self.bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}
