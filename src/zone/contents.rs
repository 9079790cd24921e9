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

//! Implementation of [`Contents`], an immutable version of a zone's
//! data.

use std::collections::{btree_map, BTreeMap};
use std::iter::FusedIterator;
use std::sync::Arc;

use super::{Changeset, Error};
use crate::name::{Label, Name};
use crate::rr::{AddOutcome, Rdata, Record, Rrset, RrsetList, Serial, Type};

////////////////////////////////////////////////////////////////////////
// CONTENTS                                                           //
////////////////////////////////////////////////////////////////////////

/// One version of a zone's data: a tree of [`Node`]s rooted at the zone
/// apex.
///
/// Children are held through [`Arc`]s. Cloning a `Contents` is
/// therefore cheap, and modifying the clone copies only the nodes on
/// the path from the apex to the modified node; every other subtree
/// stays shared with the original. This is how a transaction stages
/// changes without disturbing the version that readers see.
///
/// Once a `Contents` has been published (see [`Zone`](super::Zone)) it
/// is only ever handled through an `Arc<Contents>` and is never
/// modified again.
///
/// Nodes that own no RRsets and have no children are pruned as records
/// are removed. The apex node always exists.
#[derive(Clone, Debug)]
pub struct Contents {
    apex: Arc<Node>,
}

/// A node in the DNS tree, which may own RRsets.
#[derive(Clone, Debug)]
pub struct Node {
    name: Name,
    rrsets: RrsetList,
    children: BTreeMap<Label, Arc<Node>>,
}

impl Contents {
    /// Creates empty contents for the zone `apex`.
    pub fn new(apex: Name) -> Self {
        Self {
            apex: Arc::new(Node::new(apex)),
        }
    }

    /// Returns the zone's name.
    pub fn apex_name(&self) -> &Name {
        &self.apex.name
    }

    /// Returns the apex node.
    pub fn apex(&self) -> &Node {
        &self.apex
    }

    /// Returns whether `owner` is at or below the apex.
    pub fn contains_name(&self, owner: &Name) -> bool {
        owner.eq_or_subdomain_of(&self.apex.name)
    }

    /// Looks up the node for `owner`, if it exists.
    pub fn find_node(&self, owner: &Name) -> Option<&Node> {
        if !self.contains_name(owner) {
            return None;
        }
        let mut node = &*self.apex;
        for depth in self.apex.name.len() + 1..=owner.len() {
            let label = owner.label_at_depth(depth)?;
            node = node.children.get(label)?;
        }
        Some(node)
    }

    /// Returns the apex SOA RRset.
    pub fn soa(&self) -> Option<&Rrset> {
        self.apex.rrsets.lookup(Type::SOA)
    }

    /// Returns the serial of the apex SOA record, if there is one.
    pub fn serial(&self) -> Option<Serial> {
        self.soa()
            .and_then(|soa| soa.rdatas.iter().next())
            .and_then(Rdata::soa_serial)
    }

    /// Returns whether the zone holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.apex.rrsets.is_empty() && self.apex.children.is_empty()
    }

    /// Returns an iterator over the nodes, in DNSSEC canonical order
    /// ([RFC 4034 § 6.1]).
    ///
    /// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
    pub fn iter(&self) -> Iter {
        Iter::new(&self.apex)
    }

    /// Calls `visitor` on each node, in the same order as
    /// [`Contents::iter`]. The first error returned by `visitor` stops
    /// the traversal and is returned.
    pub fn apply<E, F>(&self, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(&Node) -> Result<(), E>,
    {
        self.iter().try_for_each(|node| visitor(node))
    }

    /// Returns an iterator over every record of the zone, as
    /// `(owner, RRset)` pairs in canonical order.
    pub fn rrsets(&self) -> impl Iterator<Item = (&Name, &Rrset)> {
        self.iter()
            .flat_map(|node| node.rrsets.iter().map(move |rrset| (&node.name, rrset)))
    }

    ////////////////////////////////////////////////////////////////////
    // MUTATION (unpublished copies only)                             //
    ////////////////////////////////////////////////////////////////////

    /// Adds a record, creating its node if necessary. If the record's
    /// RRset exists with a different TTL, the RRset takes on the new
    /// TTL.
    pub fn add_record(&mut self, record: &Record) -> Result<AddOutcome, Error> {
        self.check_in_zone(&record.owner)?;
        let node = self.node_mut(&record.owner);
        Ok(node
            .rrsets
            .add(record.rr_type, record.ttl, record.rdata.clone()))
    }

    /// Removes a single record. The TTL is not consulted.
    pub fn remove_record(
        &mut self,
        owner: &Name,
        rr_type: Type,
        rdata: &Rdata,
    ) -> Result<(), Error> {
        let present = self
            .find_node(owner)
            .and_then(|node| node.rrsets.lookup(rr_type))
            .map_or(false, |rrset| rrset.rdatas.contains(rdata));
        if !present {
            return Err(Error::NotFound);
        }
        self.modify_existing(owner, |node| {
            node.rrsets.remove(rr_type, rdata);
        });
        Ok(())
    }

    /// Removes and returns the RRset of type `rr_type` at `owner`.
    pub fn remove_rrset(&mut self, owner: &Name, rr_type: Type) -> Result<Rrset, Error> {
        if self
            .find_node(owner)
            .and_then(|node| node.rrsets.lookup(rr_type))
            .is_none()
        {
            return Err(Error::NotFound);
        }
        self.modify_existing(owner, |node| node.rrsets.remove_rrset(rr_type))
            .flatten()
            .ok_or(Error::NotFound)
    }

    /// Removes all RRsets owned by `owner`. Descendant nodes are not
    /// affected. Fails if the node owns nothing.
    pub fn remove_node(&mut self, owner: &Name) -> Result<RrsetList, Error> {
        if self.find_node(owner).map_or(true, |node| node.rrsets.is_empty()) {
            return Err(Error::NotFound);
        }
        self.modify_existing(owner, |node| std::mem::take(&mut node.rrsets))
            .ok_or(Error::NotFound)
    }

    /// Stores `rrset` at `owner`, replacing any RRset of the same type.
    pub fn insert_rrset(&mut self, owner: &Name, rrset: Rrset) -> Result<(), Error> {
        self.check_in_zone(owner)?;
        if rrset.rdatas.is_empty() {
            self.modify_existing(owner, |node| node.rrsets.remove_rrset(rrset.rr_type));
        } else {
            self.node_mut(owner).rrsets.insert_rrset(rrset);
        }
        Ok(())
    }

    /// Produces new contents by applying `changeset` to a copy of
    /// `self`. Removals are applied before additions.
    ///
    /// The changeset must fit these contents exactly: removing data
    /// that is absent, adding data that is already present, adding to
    /// an RRset with a different TTL, or a "from" SOA that does not
    /// match, all fail with [`Error::Inconsistent`].
    pub fn apply_changeset(&self, changeset: &Changeset) -> Result<Contents, Error> {
        let mut new = if changeset.is_full_replacement() {
            Contents::new(self.apex.name.clone())
        } else {
            if changeset.soa_from() != self.soa() && changeset.soa_from().is_some() {
                return Err(Error::Inconsistent("the changeset's source SOA does not match"));
            }
            self.clone()
        };

        for (owner, rrset) in changeset.iter_removals() {
            let existing = new
                .find_node(owner)
                .and_then(|node| node.rrsets.lookup(rrset.rr_type));
            match existing {
                Some(existing)
                    if existing.ttl == rrset.ttl
                        && rrset.rdatas.is_subset(&existing.rdatas) => {}
                _ => return Err(Error::Inconsistent("removal of absent data")),
            }
            new.modify_existing(owner, |node| {
                for rdata in rrset.rdatas.iter() {
                    node.rrsets.remove(rrset.rr_type, rdata);
                }
            });
        }

        for (owner, rrset) in changeset.iter_additions() {
            new.check_in_zone(owner)?;
            let node = new.node_mut(owner);
            if let Some(existing) = node.rrsets.lookup(rrset.rr_type) {
                if existing.ttl != rrset.ttl {
                    return Err(Error::Inconsistent("addition with a mismatched TTL"));
                } else if !existing.rdatas.is_disjoint(&rrset.rdatas) {
                    return Err(Error::Inconsistent("addition of present data"));
                }
            }
            for rdata in rrset.rdatas.iter() {
                node.rrsets.add(rrset.rr_type, rrset.ttl, rdata.clone());
            }
        }

        if let Some(soa_to) = changeset.soa_to() {
            new.insert_rrset(&self.apex.name, soa_to.clone())?;
        } else if changeset.soa_from().is_some() {
            new.modify_existing(&self.apex.name, |node| {
                node.rrsets.remove_rrset(Type::SOA)
            });
        }
        new.prune_all();
        Ok(new)
    }

    /// Replaces the serial of the apex SOA record. Returns `false` if
    /// there is no SOA record.
    pub fn set_serial(&mut self, serial: Serial) -> bool {
        let soa = match self.soa() {
            Some(soa) => soa,
            None => return false,
        };
        let rdatas = soa
            .rdatas
            .iter()
            .filter_map(|rdata| rdata.with_soa_serial(serial))
            .collect();
        let updated = Rrset {
            rr_type: Type::SOA,
            ttl: soa.ttl,
            rdatas,
        };
        Arc::make_mut(&mut self.apex).rrsets.insert_rrset(updated);
        true
    }

    fn check_in_zone(&self, owner: &Name) -> Result<(), Error> {
        if self.contains_name(owner) {
            Ok(())
        } else {
            Err(Error::OutOfZone(owner.clone()))
        }
    }

    /// Returns a mutable reference to the node for `owner`, creating it
    /// (and any missing ancestors) if necessary. Each node on the path
    /// that is shared with another `Contents` is copied first. `owner`
    /// must be within the zone.
    fn node_mut(&mut self, owner: &Name) -> &mut Node {
        let depth = self.apex.name.len();
        descend_or_create(&mut self.apex, owner, depth)
    }

    /// Runs `f` on the existing node for `owner` (copying the path to
    /// it as needed), then prunes nodes on the path left empty. Returns
    /// `None` without copying anything if the node does not exist.
    fn modify_existing<R, F>(&mut self, owner: &Name, f: F) -> Option<R>
    where
        F: FnOnce(&mut Node) -> R,
    {
        self.find_node(owner)?;
        let depth = self.apex.name.len();
        descend_and_prune(&mut self.apex, owner, depth, f)
    }

    /// Prunes every empty leaf in the tree.
    fn prune_all(&mut self) {
        fn has_prunable(node: &Node) -> bool {
            node.children
                .values()
                .any(|child| child.is_prunable() || has_prunable(child))
        }
        fn prune(node: &mut Arc<Node>) {
            if has_prunable(node) {
                let node = Arc::make_mut(node);
                for child in node.children.values_mut() {
                    prune(child);
                }
                node.children.retain(|_, child| !child.is_prunable());
            }
        }
        prune(&mut self.apex);
    }
}

/// Two `Contents` are equal when they hold the same records, whether
/// or not they share any nodes.
impl PartialEq for Contents {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.apex, &other.apex)
            || self
                .iter()
                .map(|node| (&node.name, &node.rrsets))
                .eq(other.iter().map(|node| (&node.name, &node.rrsets)))
    }
}

impl Eq for Contents {}

fn descend_or_create<'a>(node: &'a mut Arc<Node>, owner: &Name, depth: usize) -> &'a mut Node {
    let node = Arc::make_mut(node);
    let label = match owner.label_at_depth(depth + 1) {
        Some(label) => label,
        None => return node,
    };
    let child = node.children.entry(label.clone()).or_insert_with(|| {
        let name = owner
            .superdomain(owner.len() - depth - 1)
            .unwrap_or_else(|| owner.clone());
        Arc::new(Node::new(name))
    });
    descend_or_create(child, owner, depth + 1)
}

fn descend_and_prune<R, F>(node: &mut Arc<Node>, owner: &Name, depth: usize, f: F) -> Option<R>
where
    F: FnOnce(&mut Node) -> R,
{
    let node = Arc::make_mut(node);
    let label = match owner.label_at_depth(depth + 1) {
        Some(label) => label,
        None => return Some(f(node)),
    };
    let child = node.children.get_mut(label)?;
    let result = descend_and_prune(child, owner, depth + 1, f);
    if child.is_prunable() {
        node.children.remove(label);
    }
    result
}

////////////////////////////////////////////////////////////////////////
// NODES                                                              //
////////////////////////////////////////////////////////////////////////

impl Node {
    fn new(name: Name) -> Self {
        Self {
            name,
            rrsets: RrsetList::default(),
            children: BTreeMap::new(),
        }
    }

    /// Returns the node's owner name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the node's RRsets, ordered by type.
    pub fn rrsets(&self) -> &RrsetList {
        &self.rrsets
    }

    /// Looks up the node's RRset of type `rr_type`.
    pub fn rrset(&self, rr_type: Type) -> Option<&Rrset> {
        self.rrsets.lookup(rr_type)
    }

    /// Returns whether the node has child nodes.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn is_prunable(&self) -> bool {
        self.rrsets.is_empty() && self.children.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////
// NODE ITERATOR                                                      //
////////////////////////////////////////////////////////////////////////

/// An iterator over the nodes of a [`Contents`], in canonical order.
///
/// A pre-order walk that visits children in label order yields nodes
/// in canonical name order, since a name sorts before all of its
/// descendants and sibling subtrees sort by their distinguishing label.
pub struct Iter<'a> {
    state: IterState<'a>,
}

/// The internal state of an [`Iter`].
enum IterState<'a> {
    /// The next action is to return the current node.
    Node {
        node: &'a Node,
        stack: IterStack<'a>,
    },

    /// The next action is to begin processing the next unprocessed
    /// child of the current node.
    Children {
        children: btree_map::Values<'a, Label, Arc<Node>>,
        stack: IterStack<'a>,
    },

    /// Iteration is complete.
    Finished,
}

type IterStack<'a> = Vec<btree_map::Values<'a, Label, Arc<Node>>>;

impl<'a> Iter<'a> {
    fn new(apex: &'a Node) -> Self {
        Self {
            state: IterState::Node {
                node: apex,
                stack: Vec::new(),
            },
        }
    }

    /// Acts on the current state of the iterator. Returns the next
    /// value to return from [`Iterator::next`], or `None` if the state
    /// transition did not produce a new value. In the latter case, this
    /// method should be called repeatedly until it produces a value.
    fn execute_state_machine(&mut self) -> Option<Option<&'a Node>> {
        let previous_state = std::mem::replace(&mut self.state, IterState::Finished);
        match previous_state {
            IterState::Node { node, stack } => {
                self.state = IterState::Children {
                    children: node.children.values(),
                    stack,
                };
                Some(Some(node))
            }
            IterState::Children {
                mut children,
                mut stack,
            } => {
                if let Some(next_child) = children.next() {
                    stack.push(children);
                    self.state = IterState::Node {
                        node: next_child,
                        stack,
                    };
                    None
                } else if let Some(parent) = stack.pop() {
                    self.state = IterState::Children {
                        children: parent,
                        stack,
                    };
                    None
                } else {
                    Some(None)
                }
            }
            IterState::Finished => Some(None),
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.execute_state_machine() {
                return result;
            }
        }
    }
}

impl FusedIterator for Iter<'_> {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
