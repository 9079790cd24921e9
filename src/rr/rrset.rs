// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Data structures for storing RRsets in memory.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Rdata, Ttl, Type};

/// Stores an RRset in memory.
///
/// This is missing the NAME and CLASS fields. It's not necessary to
/// store these, since that data is maintained by the structure holding
/// the RRset.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Rrset {
    pub rr_type: Type,
    pub ttl: Ttl,
    pub rdatas: BTreeSet<Rdata>,
}

impl Rrset {
    /// Creates an RRset holding a single record.
    pub fn new(rr_type: Type, ttl: Ttl, rdata: Rdata) -> Self {
        Self {
            rr_type,
            ttl,
            rdatas: BTreeSet::from([rdata]),
        }
    }
}

/// The effect of [`RrsetList::add`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    /// The record was not present and has been added.
    Added,

    /// The record was already present, but the RRset had a different
    /// TTL, which has been changed.
    TtlChanged,

    /// The record was already present with the same TTL.
    Unchanged,
}

/// Stores all of the RRsets at a node in the DNS tree, ordered by
/// type.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RrsetList {
    rrsets: Vec<Rrset>,
}

impl RrsetList {
    /// Adds a resource record to the [`RrsetList`].
    ///
    /// All records of an RRset share one TTL ([RFC 2181 § 5.2]). If the
    /// target RRset exists with a different TTL, the whole RRset takes
    /// on the new TTL.
    ///
    /// [RFC 2181 § 5.2]: https://datatracker.ietf.org/doc/html/rfc2181#section-5.2
    pub fn add(&mut self, rr_type: Type, ttl: Ttl, rdata: Rdata) -> AddOutcome {
        match self.rrsets.binary_search_by_key(&rr_type, |r| r.rr_type) {
            Ok(index) => {
                let rrset = &mut self.rrsets[index];
                let ttl_changed = rrset.ttl != ttl;
                rrset.ttl = ttl;
                if rrset.rdatas.insert(rdata) {
                    AddOutcome::Added
                } else if ttl_changed {
                    AddOutcome::TtlChanged
                } else {
                    AddOutcome::Unchanged
                }
            }
            Err(index) => {
                self.rrsets.insert(index, Rrset::new(rr_type, ttl, rdata));
                AddOutcome::Added
            }
        }
    }

    /// Removes a single record. Returns whether it was present. An
    /// RRset left without records is removed.
    pub fn remove(&mut self, rr_type: Type, rdata: &Rdata) -> bool {
        match self.rrsets.binary_search_by_key(&rr_type, |r| r.rr_type) {
            Ok(index) => {
                let removed = self.rrsets[index].rdatas.remove(rdata);
                if self.rrsets[index].rdatas.is_empty() {
                    self.rrsets.remove(index);
                }
                removed
            }
            Err(_) => false,
        }
    }

    /// Removes and returns the RRset of type `rr_type`.
    pub fn remove_rrset(&mut self, rr_type: Type) -> Option<Rrset> {
        self.rrsets
            .binary_search_by_key(&rr_type, |r| r.rr_type)
            .ok()
            .map(|index| self.rrsets.remove(index))
    }

    /// Inserts `rrset`, replacing any RRset of the same type. Empty
    /// RRsets are not stored.
    pub fn insert_rrset(&mut self, rrset: Rrset) {
        let position = self
            .rrsets
            .binary_search_by_key(&rrset.rr_type, |r| r.rr_type);
        match (position, rrset.rdatas.is_empty()) {
            (Ok(index), false) => self.rrsets[index] = rrset,
            (Ok(index), true) => {
                self.rrsets.remove(index);
            }
            (Err(index), false) => self.rrsets.insert(index, rrset),
            (Err(_), true) => (),
        }
    }

    /// Looks up the [`Rrset`] of type `rr_type` in the `RrsetList`.
    pub fn lookup(&self, rr_type: Type) -> Option<&Rrset> {
        self.rrsets
            .binary_search_by_key(&rr_type, |r| r.rr_type)
            .map(|index| &self.rrsets[index])
            .ok()
    }

    /// Returns an iterator over the [`Rrset`]s of the `RrsetList`.
    pub fn iter(&self) -> std::slice::Iter<Rrset> {
        self.rrsets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rrsets.len()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
