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

//! Implementation of [`ZoneUpdate`], the staging area of a zone
//! transaction.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use log::warn;
use serde::Deserialize;

use super::validation::validate;
use super::{Changeset, Contents, Error, Node};
use crate::name::Name;
use crate::rr::{AddOutcome, Rdata, Record, Rrset, RrsetList, Serial, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// MODES, FLAGS, AND POLICIES                                         //
////////////////////////////////////////////////////////////////////////

/// The mode of a [`ZoneUpdate`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    /// The zone is rebuilt from nothing.
    Full,

    /// The zone's current contents are modified.
    Incremental,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// Modifier flags for a [`ZoneUpdate`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateFlags {
    /// Sign the zone with the zone's [`Signer`] before committing.
    pub sign: bool,

    /// Run semantic checks (see [`validate`]) before committing.
    pub strict: bool,
}

impl UpdateFlags {
    pub const NONE: Self = Self {
        sign: false,
        strict: false,
    };
}

/// How the SOA serial is advanced when a commit changes the zone
/// without changing the SOA record itself.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SerialPolicy {
    /// Add one to the serial.
    #[default]
    Increment,

    /// Use the current UNIX time, or add one if the current time is not
    /// newer than the serial.
    UnixTime,
}

impl SerialPolicy {
    /// Returns the serial that follows `serial` under this policy.
    pub fn next(self, serial: Serial) -> Serial {
        match self {
            Self::Increment => serial.add(1),
            Self::UnixTime => {
                let now = Serial::now();
                if now.is_newer_than(serial) {
                    now
                } else {
                    serial.add(1)
                }
            }
        }
    }
}

/// The DNSSEC signing collaborator of a zone.
///
/// Signing itself is not part of this crate. A `Signer` is handed the
/// staged contents, with their final SOA serial, and may add, replace,
/// or remove DNSSEC records as it sees fit.
pub trait Signer: fmt::Debug + Send + Sync {
    fn sign(&self, contents: &mut Contents) -> Result<(), String>;
}

////////////////////////////////////////////////////////////////////////
// ZONE UPDATES                                                       //
////////////////////////////////////////////////////////////////////////

/// The staged state of an open zone transaction.
///
/// An incremental update starts from a structurally-shared copy of the
/// zone's published contents (the *base*) and remembers which owners it
/// touched. Its changeset is the difference between the base and the
/// staged contents at those owners, so that operations that cancel each
/// other out leave no trace. A full update starts from empty contents.
///
/// The published contents are never modified: the base is only read,
/// and the staged copy shares unmodified subtrees with it.
#[derive(Debug)]
pub struct ZoneUpdate {
    mode: UpdateMode,
    flags: UpdateFlags,
    base: Option<Arc<Contents>>,
    staged: Contents,
    touched: BTreeSet<Name>,
}

/// The result of a successful [`ZoneUpdate::finish`].
#[derive(Debug)]
pub struct Finished {
    pub contents: Contents,
    pub changeset: Changeset,
}

impl ZoneUpdate {
    /// Starts an incremental update of `base`.
    pub fn incremental(base: Arc<Contents>, flags: UpdateFlags) -> Self {
        Self {
            mode: UpdateMode::Incremental,
            flags,
            staged: (*base).clone(),
            base: Some(base),
            touched: BTreeSet::new(),
        }
    }

    /// Starts a full update of the zone `apex`. `base` holds the
    /// contents being replaced, if any.
    pub fn full(apex: Name, base: Option<Arc<Contents>>, flags: UpdateFlags) -> Self {
        Self {
            mode: UpdateMode::Full,
            flags,
            base,
            staged: Contents::new(apex),
            touched: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    /// Returns the staged contents.
    pub fn staged(&self) -> &Contents {
        &self.staged
    }

    /// Adds a record. Adding a record that is already staged succeeds
    /// without effect, as does a change to nothing but the TTL of its
    /// RRset (which the whole RRset takes on).
    pub fn add(&mut self, record: &Record) -> Result<AddOutcome, Error> {
        let outcome = self.staged.add_record(record)?;
        self.touched.insert(record.owner.clone());
        Ok(outcome)
    }

    /// Removes a single record. Only the owner, type, and RDATA are
    /// matched.
    pub fn remove(&mut self, owner: &Name, rr_type: Type, rdata: &Rdata) -> Result<(), Error> {
        self.staged.remove_record(owner, rr_type, rdata)?;
        self.touched.insert(owner.clone());
        Ok(())
    }

    /// Removes the RRset of type `rr_type` at `owner`.
    pub fn remove_rrset(&mut self, owner: &Name, rr_type: Type) -> Result<Rrset, Error> {
        let rrset = self.staged.remove_rrset(owner, rr_type)?;
        self.touched.insert(owner.clone());
        Ok(rrset)
    }

    /// Removes everything owned by `owner`.
    pub fn remove_node(&mut self, owner: &Name) -> Result<RrsetList, Error> {
        let rrsets = self.staged.remove_node(owner)?;
        self.touched.insert(owner.clone());
        Ok(rrsets)
    }

    /// Returns the staged nodes: all of them, or only the one at
    /// `owner`.
    pub fn get(&self, owner: Option<&Name>) -> Result<Vec<&Node>, Error> {
        match owner {
            Some(owner) => self
                .staged
                .find_node(owner)
                .filter(|node| !node.rrsets().is_empty())
                .map(|node| vec![node])
                .ok_or(Error::NotFound),
            None => Ok(self
                .staged
                .iter()
                .filter(|node| !node.rrsets().is_empty())
                .collect()),
        }
    }

    /// Returns the TTL of the staged RRset of type `rr_type` at
    /// `owner`, if there is one.
    pub fn ttl_of(&self, owner: &Name, rr_type: Type) -> Option<Ttl> {
        self.staged
            .find_node(owner)
            .and_then(|node| node.rrset(rr_type))
            .map(|rrset| rrset.ttl)
    }

    /// Returns the changes staged so far. A full update has no base to
    /// compare against, so all of its staged records are reported as
    /// additions.
    pub fn diff(&self) -> Changeset {
        match (self.mode, &self.base) {
            (UpdateMode::Incremental, Some(base)) => {
                Changeset::diff_owners(base, &self.staged, &self.touched)
            }
            _ => Changeset::full_replacement(&self.staged),
        }
    }

    /// Finalizes the update, producing the new contents and the
    /// changeset that leads to them from the base. Returns `None` if an
    /// incremental update changed nothing (and signing was not
    /// requested).
    ///
    /// Unless the update changed the SOA record, its serial is advanced
    /// according to `policy`. An explicitly changed SOA record must
    /// have a newer serial than the base.
    pub fn finish(
        self,
        policy: SerialPolicy,
        signer: Option<&dyn Signer>,
    ) -> Result<Option<Finished>, Error> {
        let Self {
            mode,
            flags,
            base,
            mut staged,
            touched,
        } = self;
        let base = base.filter(|base| !base.is_empty());

        if mode == UpdateMode::Incremental && !flags.sign {
            if let Some(ref base) = base {
                if Changeset::diff_owners(base, &staged, &touched).is_empty() {
                    return Ok(None);
                }
            }
        }

        let new_serial = staged
            .serial()
            .ok_or_else(|| Error::ValidationFailed(vec!["the zone has no SOA record".into()]))?;
        if let Some(old_serial) = base.as_ref().and_then(|base| base.serial()) {
            let soa_changed = base.as_ref().and_then(|base| base.soa()) != staged.soa();
            if soa_changed && mode == UpdateMode::Incremental {
                if !new_serial.is_newer_than(old_serial) {
                    return Err(Error::ValidationFailed(vec![format!(
                        "the new SOA serial {} is not newer than {}",
                        new_serial, old_serial
                    )]));
                }
            } else if !new_serial.is_newer_than(old_serial) {
                staged.set_serial(policy.next(old_serial));
            }
        }

        if flags.strict {
            let issues = validate(&staged);
            let (errors, warnings): (Vec<_>, Vec<_>) =
                issues.into_iter().partition(|issue| issue.is_error());
            for warning in warnings {
                warn!("Zone {}: {}", staged.apex_name(), warning);
            }
            if !errors.is_empty() {
                return Err(Error::ValidationFailed(
                    errors.iter().map(ToString::to_string).collect(),
                ));
            }
        }

        let signed = flags.sign;
        if signed {
            let signer = signer.ok_or(Error::NotSupported)?;
            signer.sign(&mut staged).map_err(Error::Signing)?;
        }

        let changeset = match base {
            Some(ref base) if mode == UpdateMode::Incremental && !signed => {
                Changeset::diff_owners(base, &staged, &touched)
            }
            Some(ref base) => Changeset::diff(base, &staged),
            None => Changeset::full_replacement(&staged),
        };
        Ok(Some(Finished {
            contents: staged,
            changeset,
        }))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;

    lazy_static! {
        static ref APEX: Name = "almanac.test.".parse().unwrap();
        static ref WWW: Name = "www.almanac.test.".parse().unwrap();
        static ref BASE: Arc<Contents> = Arc::new(contents(&[
            "@ SOA ns hostmaster 10 3600 900 604800 300",
            "@ NS ns",
            "ns A 192.0.2.53",
            "www A 1.2.3.4",
            "old TXT \"to be removed\"",
        ]));
    }

    fn record(line: &str) -> Record {
        Record::parse(line, &APEX, Some(Ttl::from(3600))).unwrap()
    }

    fn contents(lines: &[&str]) -> Contents {
        let mut contents = Contents::new(APEX.clone());
        for line in lines {
            contents.add_record(&record(line)).unwrap();
        }
        contents
    }

    fn finish(update: ZoneUpdate) -> Finished {
        update
            .finish(SerialPolicy::Increment, None)
            .unwrap()
            .unwrap()
    }

    #[derive(Debug)]
    struct AddsTxt;

    impl Signer for AddsTxt {
        fn sign(&self, contents: &mut Contents) -> Result<(), String> {
            let record = Record::parse("@ 300 TXT signed", contents.apex_name(), None)
                .map_err(|e| e.to_string())?;
            contents.add_record(&record).map_err(|e| e.to_string())?;
            Ok(())
        }
    }

    #[test]
    fn incremental_commit_replays_equivalently() {
        let mut update = ZoneUpdate::incremental(BASE.clone(), UpdateFlags::NONE);
        update.remove(&WWW, Type::A, &record("www A 1.2.3.4").rdata).unwrap();
        update.add(&record("www A 5.6.7.8")).unwrap();
        update.add(&record("new AAAA 2001:db8::1")).unwrap();
        update.remove_node(&"old.almanac.test.".parse().unwrap()).unwrap();
        let finished = finish(update);

        assert_eq!(finished.contents.serial(), Some(Serial::from(11)));
        assert_eq!(finished.changeset.from_serial(), Some(Serial::from(10)));
        assert_eq!(finished.changeset.to_serial(), Some(Serial::from(11)));
        assert_eq!(
            BASE.apply_changeset(&finished.changeset).unwrap(),
            finished.contents
        );
        assert!(finished
            .contents
            .find_node(&"old.almanac.test.".parse().unwrap())
            .is_none());

        // The published base is untouched.
        assert_eq!(BASE.serial(), Some(Serial::from(10)));
        assert!(BASE.find_node(&"new.almanac.test.".parse().unwrap()).is_none());
    }

    #[test]
    fn cancelling_operations_leave_nothing() {
        let mut update = ZoneUpdate::incremental(BASE.clone(), UpdateFlags::NONE);
        update.add(&record("tmp A 192.0.2.1")).unwrap();
        update
            .remove(
                &"tmp.almanac.test.".parse().unwrap(),
                Type::A,
                &record("tmp A 192.0.2.1").rdata,
            )
            .unwrap();
        assert!(update.diff().is_empty());
        assert!(update
            .finish(SerialPolicy::Increment, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn add_is_silent_for_duplicates_and_ttl_changes() {
        let mut update = ZoneUpdate::incremental(BASE.clone(), UpdateFlags::NONE);
        assert_eq!(
            update.add(&record("www A 1.2.3.4")).unwrap(),
            AddOutcome::Unchanged
        );
        assert_eq!(
            update.add(&record("www 60 A 1.2.3.4")).unwrap(),
            AddOutcome::TtlChanged
        );
        assert_eq!(update.ttl_of(&WWW, Type::A), Some(Ttl::from(60)));
    }

    #[test]
    fn removals_of_absent_data_fail() {
        let mut update = ZoneUpdate::incremental(BASE.clone(), UpdateFlags::NONE);
        let missing: Name = "missing.almanac.test.".parse().unwrap();
        assert!(matches!(
            update.remove(&WWW, Type::A, &record("www A 9.9.9.9").rdata),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            update.remove_rrset(&WWW, Type::AAAA),
            Err(Error::NotFound)
        ));
        assert!(matches!(update.remove_node(&missing), Err(Error::NotFound)));
        assert!(matches!(update.get(Some(&missing)), Err(Error::NotFound)));
    }

    #[test]
    fn get_reflects_staged_state() {
        let mut update = ZoneUpdate::incremental(BASE.clone(), UpdateFlags::NONE);
        update.add(&record("www A 5.6.7.8")).unwrap();
        let nodes = update.get(Some(&WWW)).unwrap();
        assert_eq!(nodes[0].rrset(Type::A).unwrap().rdatas.len(), 2);
        assert_eq!(update.get(None).unwrap().len(), 4);
    }

    #[test]
    fn explicit_soa_must_be_newer() {
        let mut update = ZoneUpdate::incremental(BASE.clone(), UpdateFlags::NONE);
        update
            .add(&record("@ SOA ns hostmaster 5 3600 900 604800 300"))
            .unwrap();
        update
            .remove(
                &APEX,
                Type::SOA,
                &record("@ SOA ns hostmaster 10 3600 900 604800 300").rdata,
            )
            .unwrap();
        assert!(matches!(
            update.finish(SerialPolicy::Increment, None),
            Err(Error::ValidationFailed(_))
        ));

        let mut update = ZoneUpdate::incremental(BASE.clone(), UpdateFlags::NONE);
        update.remove_rrset(&APEX, Type::SOA).unwrap();
        update
            .add(&record("@ SOA ns hostmaster 20 3600 900 604800 300"))
            .unwrap();
        let finished = finish(update);
        assert_eq!(finished.contents.serial(), Some(Serial::from(20)));
    }

    #[test]
    fn strict_commit_rejects_invalid_zone() {
        let flags = UpdateFlags {
            strict: true,
            ..UpdateFlags::NONE
        };
        let mut update = ZoneUpdate::incremental(BASE.clone(), flags);
        update.remove_rrset(&APEX, Type::NS).unwrap();
        assert!(matches!(
            update.finish(SerialPolicy::Increment, None),
            Err(Error::ValidationFailed(issues)) if issues.len() == 1
        ));
    }

    #[test]
    fn full_update_without_base_is_full_replacement() {
        let mut update = ZoneUpdate::full(APEX.clone(), None, UpdateFlags::NONE);
        assert_eq!(update.mode(), UpdateMode::Full);
        update
            .add(&record("@ SOA ns hostmaster 1 3600 900 604800 300"))
            .unwrap();
        update.add(&record("@ NS ns")).unwrap();
        assert_eq!(update.diff().iter_additions().count(), 1);
        let finished = finish(update);
        assert!(finished.changeset.is_full_replacement());
        assert_eq!(finished.contents.serial(), Some(Serial::from(1)));

        let update = ZoneUpdate::full(APEX.clone(), None, UpdateFlags::NONE);
        assert!(matches!(
            update.finish(SerialPolicy::Increment, None),
            Err(Error::ValidationFailed(_))
        ));
    }

    #[test]
    fn full_update_with_base_advances_stale_serial() {
        let mut update = ZoneUpdate::full(APEX.clone(), Some(BASE.clone()), UpdateFlags::NONE);
        update
            .add(&record("@ SOA ns hostmaster 3 3600 900 604800 300"))
            .unwrap();
        update.add(&record("@ NS ns")).unwrap();
        update.add(&record("ns A 192.0.2.53")).unwrap();
        let finished = finish(update);
        assert_eq!(finished.contents.serial(), Some(Serial::from(11)));
        assert!(!finished.changeset.is_full_replacement());
        assert_eq!(
            BASE.apply_changeset(&finished.changeset).unwrap(),
            finished.contents
        );
    }

    #[test]
    fn signing_uses_signer() {
        let flags = UpdateFlags {
            sign: true,
            ..UpdateFlags::NONE
        };
        let update = ZoneUpdate::incremental(BASE.clone(), flags);
        assert!(matches!(
            update.finish(SerialPolicy::Increment, None),
            Err(Error::NotSupported)
        ));

        let update = ZoneUpdate::incremental(BASE.clone(), flags);
        let finished = update
            .finish(SerialPolicy::Increment, Some(&AddsTxt))
            .unwrap()
            .unwrap();
        assert!(finished.contents.apex().rrset(Type::TXT).is_some());
        assert_eq!(finished.contents.serial(), Some(Serial::from(11)));
        assert_eq!(
            BASE.apply_changeset(&finished.changeset).unwrap(),
            finished.contents
        );
    }

    #[test]
    fn unixtime_policy_falls_back_to_increment() {
        let far_future = Serial::from(u32::from(Serial::now()).wrapping_add(1 << 30));
        assert_eq!(SerialPolicy::UnixTime.next(far_future), far_future.add(1));
        assert!(SerialPolicy::UnixTime
            .next(Serial::from(1))
            .is_newer_than(Serial::from(1)));
    }
}
