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

//! Implementation of [`Changeset`], the difference between two
//! versions of a zone.

use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;

use serde::{Deserialize, Serialize};

use super::contents::{Contents, Node};
use crate::name::Name;
use crate::rr::{Rdata, Rrset, RrsetList, Serial, Type};

/// The difference between two versions of a zone, in the style of an
/// IXFR response ([RFC 1995]): the SOA RRset before and after, the
/// records removed, and the records added.
///
/// The apex SOA RRset is never part of the removal and addition lists;
/// [`Changeset::soa_from`] and [`Changeset::soa_to`] carry it, and they
/// are set only when the SOA actually changed.
///
/// A *full replacement* changeset describes a zone that is rebuilt from
/// nothing: it has no "from" SOA and no removals, and its additions are
/// the entire zone. Applying it discards whatever was there before.
///
/// [RFC 1995]: https://datatracker.ietf.org/doc/html/rfc1995
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    soa_from: Option<Rrset>,
    soa_to: Option<Rrset>,
    removals: BTreeMap<Name, RrsetList>,
    additions: BTreeMap<Name, RrsetList>,
    full: bool,
}

impl Changeset {
    /// Computes the changeset that transforms `from` into `to`.
    ///
    /// RRsets are compared per owner and type. When the TTLs agree,
    /// only the records present on one side are reported; when they
    /// differ, the whole old RRset is removed and the whole new RRset
    /// added.
    pub fn diff(from: &Contents, to: &Contents) -> Self {
        let mut changeset = Self::default();
        changeset.diff_soa(from, to);
        let mut from_nodes = from.iter().peekable();
        let mut to_nodes = to.iter().peekable();
        while let Some((old, new)) = next_pair(&mut from_nodes, &mut to_nodes) {
            let owner = old.or(new).map(Node::name);
            if let Some(owner) = owner {
                changeset.diff_node(
                    owner,
                    old.map(Node::rrsets),
                    new.map(Node::rrsets),
                    owner == from.apex_name(),
                );
            }
        }
        changeset
    }

    /// Like [`Changeset::diff`], but only compares the nodes of the
    /// given owners. Owners outside both versions are ignored.
    pub fn diff_owners<'a, I>(from: &Contents, to: &Contents, owners: I) -> Self
    where
        I: IntoIterator<Item = &'a Name>,
    {
        let mut changeset = Self::default();
        changeset.diff_soa(from, to);
        for owner in owners {
            changeset.diff_node(
                owner,
                from.find_node(owner).map(Node::rrsets),
                to.find_node(owner).map(Node::rrsets),
                owner == from.apex_name(),
            );
        }
        changeset
    }

    /// Creates a full replacement changeset holding all of `contents`.
    pub fn full_replacement(contents: &Contents) -> Self {
        let mut changeset = Self {
            soa_to: contents.soa().cloned(),
            full: true,
            ..Self::default()
        };
        for (owner, rrset) in contents.rrsets() {
            if !(rrset.rr_type == Type::SOA && owner == contents.apex_name()) {
                changeset.push(true, owner, rrset.clone());
            }
        }
        changeset
    }

    /// Returns the "from" SOA RRset, if the SOA changed.
    pub fn soa_from(&self) -> Option<&Rrset> {
        self.soa_from.as_ref()
    }

    /// Returns the "to" SOA RRset, if the SOA changed.
    pub fn soa_to(&self) -> Option<&Rrset> {
        self.soa_to.as_ref()
    }

    /// Returns the serial of the "from" SOA.
    pub fn from_serial(&self) -> Option<Serial> {
        self.soa_from
            .as_ref()
            .and_then(|soa| soa.rdatas.iter().next())
            .and_then(|rdata| rdata.soa_serial())
    }

    /// Returns the serial of the "to" SOA.
    pub fn to_serial(&self) -> Option<Serial> {
        self.soa_to
            .as_ref()
            .and_then(|soa| soa.rdatas.iter().next())
            .and_then(|rdata| rdata.soa_serial())
    }

    /// Returns whether this is a full replacement changeset.
    pub fn is_full_replacement(&self) -> bool {
        self.full
    }

    /// Returns whether the changeset changes nothing.
    pub fn is_empty(&self) -> bool {
        !self.full
            && self.soa_from.is_none()
            && self.soa_to.is_none()
            && self.removals.is_empty()
            && self.additions.is_empty()
    }

    /// Returns a new iterator over the removed `(owner, RRset)` pairs,
    /// in canonical order.
    pub fn iter_removals(&self) -> impl Iterator<Item = (&Name, &Rrset)> {
        flatten(&self.removals)
    }

    /// Returns a new iterator over the added `(owner, RRset)` pairs, in
    /// canonical order.
    pub fn iter_additions(&self) -> impl Iterator<Item = (&Name, &Rrset)> {
        flatten(&self.additions)
    }

    /// Sets the "to" SOA RRset, e.g. after a serial change. If the SOA
    /// was not changed before, `old` becomes the "from" SOA.
    pub fn set_soa(&mut self, old: Option<&Rrset>, new: Rrset) {
        if self.soa_from.is_none() && !self.full {
            self.soa_from = old.cloned();
        }
        self.soa_to = Some(new);
    }

    fn diff_soa(&mut self, from: &Contents, to: &Contents) {
        if from.soa() != to.soa() {
            self.soa_from = from.soa().cloned();
            self.soa_to = to.soa().cloned();
        }
    }

    fn diff_node(
        &mut self,
        owner: &Name,
        old: Option<&RrsetList>,
        new: Option<&RrsetList>,
        at_apex: bool,
    ) {
        let old_types = old.into_iter().flat_map(RrsetList::iter).map(|r| r.rr_type);
        let new_types = new.into_iter().flat_map(RrsetList::iter).map(|r| r.rr_type);
        let types: BTreeSet<Type> = old_types.chain(new_types).collect();
        for rr_type in types {
            if at_apex && rr_type == Type::SOA {
                continue;
            }
            let old_rrset = old.and_then(|list| list.lookup(rr_type));
            let new_rrset = new.and_then(|list| list.lookup(rr_type));
            match (old_rrset, new_rrset) {
                (Some(old_rrset), Some(new_rrset)) if old_rrset.ttl == new_rrset.ttl => {
                    let removed = &old_rrset.rdatas - &new_rrset.rdatas;
                    let added = &new_rrset.rdatas - &old_rrset.rdatas;
                    self.push_rdatas(false, owner, rr_type, old_rrset, removed);
                    self.push_rdatas(true, owner, rr_type, new_rrset, added);
                }
                (old_rrset, new_rrset) => {
                    if let Some(old_rrset) = old_rrset {
                        self.push(false, owner, old_rrset.clone());
                    }
                    if let Some(new_rrset) = new_rrset {
                        self.push(true, owner, new_rrset.clone());
                    }
                }
            }
        }
    }

    fn push_rdatas(
        &mut self,
        addition: bool,
        owner: &Name,
        rr_type: Type,
        like: &Rrset,
        rdatas: BTreeSet<Rdata>,
    ) {
        if !rdatas.is_empty() {
            let rrset = Rrset {
                rr_type,
                ttl: like.ttl,
                rdatas,
            };
            self.push(addition, owner, rrset);
        }
    }

    fn push(&mut self, addition: bool, owner: &Name, rrset: Rrset) {
        let lists = if addition {
            &mut self.additions
        } else {
            &mut self.removals
        };
        lists.entry(owner.clone()).or_default().insert_rrset(rrset);
    }
}

fn flatten(lists: &BTreeMap<Name, RrsetList>) -> impl Iterator<Item = (&Name, &Rrset)> {
    lists
        .iter()
        .flat_map(|(owner, list)| list.iter().map(move |rrset| (owner, rrset)))
}

/// Merge-joins two canonically ordered node iterators, returning the
/// next node from either side together with its counterpart, if any.
fn next_pair<'a, A, B>(
    from: &mut Peekable<A>,
    to: &mut Peekable<B>,
) -> Option<(Option<&'a Node>, Option<&'a Node>)>
where
    A: Iterator<Item = &'a Node>,
    B: Iterator<Item = &'a Node>,
{
    let ordering = match (from.peek(), to.peek()) {
        (None, None) => return None,
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (Some(a), Some(b)) => a.name().cmp(b.name()),
    };
    Some(match ordering {
        std::cmp::Ordering::Less => (from.next(), None),
        std::cmp::Ordering::Greater => (None, to.next()),
        std::cmp::Ordering::Equal => (from.next(), to.next()),
    })
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::rr::{Record, Ttl};

    lazy_static! {
        static ref APEX: Name = "almanac.test.".parse().unwrap();
        static ref BASE: Contents = build(&[
            "@ 3600 SOA ns hostmaster 1 3600 900 604800 300",
            "@ 3600 NS ns",
            "ns 3600 A 192.0.2.53",
            "www 3600 A 192.0.2.1",
            "www 3600 A 192.0.2.2",
            "old 3600 TXT gone",
        ]);
    }

    fn build(lines: &[&str]) -> Contents {
        let mut contents = Contents::new(APEX.clone());
        for line in lines {
            let record = Record::parse(line, &APEX, None).unwrap();
            contents.add_record(&record).unwrap();
        }
        contents
    }

    fn collect<'a>(
        iter: impl Iterator<Item = (&'a Name, &'a Rrset)>,
    ) -> Vec<(String, Ttl, Vec<String>)> {
        iter.map(|(owner, rrset)| {
            (
                format!("{} {}", owner, rrset.rr_type),
                rrset.ttl,
                rrset.rdatas.iter().map(|r| r.to_string()).collect(),
            )
        })
        .collect()
    }

    #[test]
    fn diff_of_identical_contents_is_empty() {
        assert!(Changeset::diff(&BASE, &BASE.clone()).is_empty());
        assert!(Changeset::default().is_empty());
    }

    #[test]
    fn diff_reports_record_level_changes() {
        let target = build(&[
            "@ 3600 SOA ns hostmaster 2 3600 900 604800 300",
            "@ 3600 NS ns",
            "ns 3600 A 192.0.2.53",
            "www 3600 A 192.0.2.1",
            "www 3600 A 192.0.2.3",
            "new 3600 TXT hello",
        ]);
        let changeset = Changeset::diff(&BASE, &target);
        assert_eq!(changeset.from_serial(), Some(Serial::from(1)));
        assert_eq!(changeset.to_serial(), Some(Serial::from(2)));
        assert_eq!(
            collect(changeset.iter_removals()),
            [
                ("old.almanac.test. TXT".to_owned(), Ttl::from(3600), vec!["gone".to_owned()]),
                ("www.almanac.test. A".to_owned(), Ttl::from(3600), vec!["192.0.2.2".to_owned()]),
            ],
        );
        assert_eq!(
            collect(changeset.iter_additions()),
            [
                ("new.almanac.test. TXT".to_owned(), Ttl::from(3600), vec!["hello".to_owned()]),
                ("www.almanac.test. A".to_owned(), Ttl::from(3600), vec!["192.0.2.3".to_owned()]),
            ],
        );

        // The iterators can be restarted.
        assert_eq!(changeset.iter_additions().count(), 2);
        assert_eq!(changeset.iter_additions().count(), 2);
    }

    #[test]
    fn diff_replaces_whole_rrset_on_ttl_change() {
        let mut target = BASE.clone();
        let record = Record::parse("www 60 A 192.0.2.1", &APEX, None).unwrap();
        target.add_record(&record).unwrap();
        let changeset = Changeset::diff(&BASE, &target);
        assert!(changeset.soa_from().is_none());
        let removed = collect(changeset.iter_removals());
        let added = collect(changeset.iter_additions());
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].1, Ttl::from(3600));
        assert_eq!(removed[0].2.len(), 2);
        assert_eq!(added[0].1, Ttl::from(60));
        assert_eq!(added[0].2.len(), 2);
    }

    #[test]
    fn applying_diff_round_trips() {
        let target = build(&[
            "@ 3600 SOA ns hostmaster 5 3600 900 604800 300",
            "@ 7200 NS ns",
            "@ 7200 NS ns2.elsewhere.test.",
            "ns 3600 A 192.0.2.54",
            "a.b.c 3600 AAAA 2001:db8::1",
        ]);
        let changeset = Changeset::diff(&BASE, &target);
        assert_eq!(BASE.apply_changeset(&changeset).unwrap(), target);

        let backwards = Changeset::diff(&target, &BASE);
        assert_eq!(target.apply_changeset(&backwards).unwrap(), *BASE);
    }

    #[test]
    fn full_replacement_rebuilds_contents() {
        let changeset = Changeset::full_replacement(&BASE);
        assert!(changeset.is_full_replacement());
        assert!(changeset.soa_from().is_none());
        assert_eq!(changeset.to_serial(), Some(Serial::from(1)));
        assert!(changeset
            .iter_additions()
            .all(|(_, rrset)| rrset.rr_type != Type::SOA));
        let other = build(&["@ 3600 TXT unrelated"]);
        assert_eq!(other.apply_changeset(&changeset).unwrap(), *BASE);
    }

    #[test]
    fn applying_inconsistent_changeset_fails() {
        let target = build(&["@ 3600 SOA ns hostmaster 9 3600 900 604800 300"]);
        let changeset = Changeset::diff(&BASE, &target);
        let unrelated = build(&["@ 3600 SOA ns hostmaster 1 3600 900 604800 300"]);
        assert!(matches!(
            unrelated.apply_changeset(&changeset),
            Err(crate::zone::Error::Inconsistent(_)),
        ));
    }
}
