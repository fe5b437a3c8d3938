//! Replicated sequence state (RGA).
//!
//! Each element is identified by the [`OpId`] of the insert that created it
//! and anchors after another element (or the head). Concurrent inserts at
//! the same anchor are ordered descending by inserting id, which every
//! replica computes identically. Removals tombstone elements instead of
//! deleting them, so concurrent inserts can still anchor on a removed
//! element; the materialized view skips tombstones.

use orde_core::{OpId, Payload};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One sequence element, alive or tombstoned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeqElem {
    /// The insert operation that created this element.
    pub id: OpId,
    /// The element this one anchors after; `None` anchors at the head.
    pub anchor: Option<OpId>,
    /// The inserted value.
    pub payload: Payload,
    /// Set once a remove targets this element.
    pub tombstoned: bool,
}

/// State of one replicated sequence container.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeqState {
    /// All elements ever inserted, keyed by id.
    elems: HashMap<OpId, SeqElem>,
    /// Per-anchor children, sorted descending by id (`None` = head).
    children: HashMap<Option<OpId>, Vec<OpId>>,
}

impl SeqState {
    /// Create an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Integrate an insert. Idempotent: a known id is left untouched.
    ///
    /// Returns `false` when the anchor is unknown; with causal gating in
    /// front of the document this does not happen.
    pub fn insert(&mut self, id: OpId, anchor: Option<OpId>, payload: Payload) -> bool {
        if self.elems.contains_key(&id) {
            return true;
        }
        if let Some(anchor_id) = anchor {
            if !self.elems.contains_key(&anchor_id) {
                return false;
            }
        }

        self.elems.insert(
            id,
            SeqElem {
                id,
                anchor,
                payload,
                tombstoned: false,
            },
        );

        let siblings = self.children.entry(anchor).or_default();
        let pos = siblings.iter().position(|c| c < &id).unwrap_or(siblings.len());
        siblings.insert(pos, id);
        true
    }

    /// Tombstone an element. Idempotent; returns `false` if the id is
    /// unknown.
    pub fn remove(&mut self, target: OpId) -> bool {
        match self.elems.get_mut(&target) {
            Some(elem) => {
                elem.tombstoned = true;
                true
            }
            None => false,
        }
    }

    /// Check whether an element exists (tombstoned or not).
    pub fn contains(&self, id: OpId) -> bool {
        self.elems.contains_key(&id)
    }

    /// Check whether an element exists and is not tombstoned.
    pub fn is_visible(&self, id: OpId) -> bool {
        self.elems.get(&id).is_some_and(|e| !e.tombstoned)
    }

    /// Look up an element.
    pub fn get(&self, id: OpId) -> Option<&SeqElem> {
        self.elems.get(&id)
    }

    /// The id of the element at a visible index.
    pub fn id_at(&self, index: usize) -> Option<OpId> {
        self.iter_visible().nth(index).map(|e| e.id)
    }

    /// The visible index of an element, if it is visible.
    pub fn index_of(&self, id: OpId) -> Option<usize> {
        self.iter_visible().position(|e| e.id == id)
    }

    /// The id of the last visible element, if any.
    pub fn last_visible(&self) -> Option<OpId> {
        self.iter_visible().last().map(|e| e.id)
    }

    /// Number of visible elements.
    pub fn visible_len(&self) -> usize {
        self.iter_visible().count()
    }

    /// Iterate over visible elements in document order.
    pub fn iter_visible(&self) -> impl Iterator<Item = &SeqElem> {
        self.iter_all().filter(|e| !e.tombstoned)
    }

    /// Iterate over all elements (tombstones included) in document order.
    pub fn iter_all(&self) -> impl Iterator<Item = &SeqElem> {
        SeqIter {
            seq: self,
            stack: self
                .children
                .get(&None)
                .map(|head| head.iter().rev().copied().collect())
                .unwrap_or_default(),
            visited: HashSet::new(),
        }
    }
}

/// Depth-first traversal over the anchor tree, yielding document order.
struct SeqIter<'a> {
    seq: &'a SeqState,
    stack: Vec<OpId>,
    visited: HashSet<OpId>,
}

impl<'a> Iterator for SeqIter<'a> {
    type Item = &'a SeqElem;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            if let Some(children) = self.seq.children.get(&Some(id)) {
                for child in children.iter().rev() {
                    if !self.visited.contains(child) {
                        self.stack.push(*child);
                    }
                }
            }
            if let Some(elem) = self.seq.elems.get(&id) {
                return Some(elem);
            }
        }
        None
    }
}
