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

//! Implementation of zone validation, to detect semantic errors and
//! warnings in staged zone contents before they are committed.
//!
//! [RFC 1035 § 5.2] (corrected by [Erratum 5626]) indicates that a zone
//! should be checked for semantic errors in addition to syntactic
//! errors. The checks implemented by [`validate`] are:
//!
//! 1. Exactly one SOA record should be present at the zone apex.
//! 2. ([Erratum 5626]) At least one NS record must be present at the
//!    zone apex.
//! 3. A name cannot own more than one CNAME record.
//! 4. A name cannot own a CNAME record and another record of a
//!    different type. (DNSSEC records maintained by a signer are
//!    exempt, per [RFC 4035 § 2.5].)
//! 5. Any in-zone nameservers referenced by NS records must have A or
//!    AAAA records. Below a delegation these are glue records.
//! 6. Any in-zone mail exchangers referenced by MX records should have
//!    A or AAAA records (warning only).
//! 7. Wildcard domain names should not own NS records, since
//!    [RFC 4592 § 4.2] discourages this and leaves its semantics
//!    undefined (warning only).
//!
//! The following are enforced by the design of
//! [`Contents`](super::Contents) and need no check here: all records
//! are of class IN, their owners are at or below the apex, and the
//! records of an RRset share one TTL ([RFC 2181 § 5.2]).
//!
//! [RFC 1035 § 5.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-5.2
//! [Erratum 5626]: https://www.rfc-editor.org/errata/eid5626
//! [RFC 2181 § 5.2]: https://datatracker.ietf.org/doc/html/rfc2181#section-5.2
//! [RFC 4035 § 2.5]: https://datatracker.ietf.org/doc/html/rfc4035#section-2.5
//! [RFC 4592 § 4.2]: https://datatracker.ietf.org/doc/html/rfc4592#section-4.2

use std::collections::BTreeSet;
use std::fmt;

use super::contents::{Contents, Node};
use crate::name::Name;
use crate::rr::{Rrset, Type};

////////////////////////////////////////////////////////////////////////
// VALIDATION ISSUES                                                  //
////////////////////////////////////////////////////////////////////////

/// Indicates a semantic error or warning found in zone contents.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ValidationIssue {
    MissingApexSoa,
    TooManyApexSoas,
    MissingApexNs,
    MissingNsAddress(Name),
    MissingMxAddress(Name),
    DuplicateCname(Name),
    OtherRecordsAtCname(Name),
    NsAtWildcard(Name),
}

impl ValidationIssue {
    /// Returns whether the `ValidationIssue` represents a (fatal)
    /// error. Otherwise, it is a warning.
    pub fn is_error(&self) -> bool {
        !matches!(*self, Self::MissingMxAddress(_) | Self::NsAtWildcard(_))
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingApexSoa => f.write_str("the zone is missing an SOA record"),
            Self::TooManyApexSoas => {
                f.write_str("the zone has too many SOA records (precisely one is needed)")
            }
            Self::MissingApexNs => f.write_str("the zone is missing an NS record"),
            Self::MissingNsAddress(nsdname) => write!(
                f,
                "the in-zone nameserver {} is missing an address",
                nsdname
            ),
            Self::MissingMxAddress(name) => write!(
                f,
                "the in-zone mail exchanger {} is missing an address",
                name
            ),
            Self::DuplicateCname(name) => {
                write!(f, "the name {} has duplicate CNAME records", name)
            }
            Self::OtherRecordsAtCname(name) => write!(
                f,
                "the name {}, which has a CNAME record, cannot have other records",
                name
            ),
            Self::NsAtWildcard(name) => write!(
                f,
                "the wildcard domain name {} owns an NS RRset; \
                 this is discouraged and its semantics are undefined",
                name
            ),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// VALIDATION LOGIC                                                   //
////////////////////////////////////////////////////////////////////////

/// Checks `contents` for semantic errors and warnings. The issues are
/// returned sorted and without duplicates.
pub fn validate(contents: &Contents) -> Vec<ValidationIssue> {
    let mut issues = BTreeSet::new();

    // Check 1: there must be exactly one SOA record for the zone.
    match contents.soa() {
        Some(soa) if soa.rdatas.len() != 1 => {
            issues.insert(ValidationIssue::TooManyApexSoas);
        }
        Some(_) => (),
        None => {
            issues.insert(ValidationIssue::MissingApexSoa);
        }
    }

    // Check 2: there must be at least one NS record for the zone.
    if contents.apex().rrset(Type::NS).is_none() {
        issues.insert(ValidationIssue::MissingApexNs);
    }

    // The remaining checks are done node by node.
    for node in contents.iter() {
        scan_node(contents, node, &mut issues);
    }
    issues.into_iter().collect()
}

/// Scans a node, performing checks 3 through 7.
fn scan_node(contents: &Contents, node: &Node, issues: &mut BTreeSet<ValidationIssue>) {
    let owner = node.name();
    for rrset in node.rrsets().iter() {
        match rrset.rr_type {
            Type::CNAME => {
                let others = node
                    .rrsets()
                    .iter()
                    .filter(|r| r.rr_type != Type::CNAME && !r.rr_type.is_dnssec_maintained())
                    .count();
                if others != 0 {
                    issues.insert(ValidationIssue::OtherRecordsAtCname(owner.clone()));
                }
                if rrset.rdatas.len() != 1 {
                    issues.insert(ValidationIssue::DuplicateCname(owner.clone()));
                }
            }
            Type::MX => {
                for exchange in targets(rrset) {
                    if !has_address(contents, &exchange) {
                        issues.insert(ValidationIssue::MissingMxAddress(exchange));
                    }
                }
            }
            Type::NS => {
                if owner.is_wildcard() {
                    issues.insert(ValidationIssue::NsAtWildcard(owner.clone()));
                }
                for nsdname in targets(rrset) {
                    if !has_address(contents, &nsdname) {
                        issues.insert(ValidationIssue::MissingNsAddress(nsdname));
                    }
                }
            }
            _ => (),
        }
    }
}

/// Returns the names that an RRset's records point to.
fn targets(rrset: &Rrset) -> impl Iterator<Item = Name> + '_ {
    rrset
        .rdatas
        .iter()
        .filter_map(move |rdata| rdata.target(rrset.rr_type))
}

/// Returns whether `name` is outside the zone (so that its addresses
/// are none of our business) or owns an address record in the zone.
fn has_address(contents: &Contents, name: &Name) -> bool {
    if !contents.contains_name(name) {
        return true;
    }
    contents.find_node(name).map_or(false, |node| {
        node.rrset(Type::A).is_some() || node.rrset(Type::AAAA).is_some()
    })
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
