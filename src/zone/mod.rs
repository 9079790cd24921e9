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

//! Zones and their transactions.
//!
//! A [`Zone`] publishes one version of its data at a time, as an
//! immutable [`Contents`] snapshot. Readers load the current snapshot
//! without locking and may hold on to it for as long as they like.
//! Writers go through a transaction: [`Zone::begin`] opens one (at most
//! one per zone), [`Zone::update`] stages changes in a [`ZoneUpdate`],
//! and [`Zone::commit`] journals the resulting [`Changeset`] and then
//! swaps in the new snapshot. Readers see either the old snapshot or
//! the new one, never anything in between.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use arc_swap::{ArcSwap, ArcSwapOption};
use log::{debug, info, warn};

use crate::journal::{self, Journal};
use crate::name::Name;
use crate::rr::Serial;
use crate::zone_file;

mod acl;
mod changeset;
mod contents;
mod error;
mod events;
mod update;
mod validation;
pub use acl::{Acl, AclRule, ZoneAcls};
pub use changeset::Changeset;
pub use contents::{Contents, Iter, Node};
pub use error::Error;
pub use events::{format_duration, EventType, ZoneEvents};
pub use update::{Finished, SerialPolicy, Signer, UpdateFlags, UpdateMode, ZoneUpdate};
pub use validation::{validate, ValidationIssue};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION AND FLAGS                                            //
////////////////////////////////////////////////////////////////////////

/// The configuration of a [`Zone`].
#[derive(Clone, Debug)]
pub struct ZoneConfig {
    /// The zone file the zone is loaded from and flushed to.
    pub zone_file: Option<PathBuf>,

    /// The journal file. Without one, commits are not journaled.
    pub journal: Option<PathBuf>,

    /// The maximum size of the journal, in octets (0 for unlimited).
    pub journal_max_size: u64,

    /// Seconds after a commit at which the zone file is flushed: 0
    /// flushes immediately, and a negative value only flushes when the
    /// journal fills up.
    pub zonefile_sync: i64,

    pub serial_policy: SerialPolicy,

    /// The zone's masters. A zone with masters is a slave zone.
    pub masters: Vec<SocketAddr>,

    pub acls: ZoneAcls,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            zone_file: None,
            journal: None,
            journal_max_size: 100 * 1024 * 1024,
            zonefile_sync: 0,
            serial_policy: SerialPolicy::Increment,
            masters: Vec::new(),
            acls: ZoneAcls::default(),
        }
    }
}

/// Runtime flags of a [`Zone`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ZoneFlag {
    /// The zone's contents have expired and are no longer served.
    Expired,

    /// The next transfer must be a full transfer (AXFR).
    ForceAxfr,

    /// The next flush must write the zone file even if it is current.
    ForceFlush,

    /// The next signing must sign the whole zone.
    ForceResign,
}

impl ZoneFlag {
    fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// A dynamic update request ([RFC 2136]) waiting to be processed. The
/// message is kept in wire format; decoding it is up to the consumer.
///
/// [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateRequest {
    pub remote: SocketAddr,
    pub key: Option<Name>,
    pub message: Vec<u8>,
}

/// The zone file bookkeeping of a [`Zone`]: the serial and
/// modification time of the zone file as last read or written.
#[derive(Clone, Copy, Debug, Default)]
struct SyncState {
    serial: Option<Serial>,
    mtime: Option<SystemTime>,
}

////////////////////////////////////////////////////////////////////////
// ZONES                                                              //
////////////////////////////////////////////////////////////////////////

/// A zone served by the server.
#[derive(Debug)]
pub struct Zone {
    name: Name,
    zone_file: Option<PathBuf>,
    zonefile_sync: i64,
    serial_policy: SerialPolicy,
    contents: ArcSwapOption<Contents>,
    control_update: Mutex<Option<ZoneUpdate>>,
    journal: Option<Journal>,
    signer: Option<Arc<dyn Signer>>,
    sync: Mutex<SyncState>,
    flags: AtomicU32,
    ddns_queue: Mutex<VecDeque<UpdateRequest>>,
    acls: ArcSwap<ZoneAcls>,
    masters: Mutex<Vec<SocketAddr>>,
    events: ZoneEvents,
}

impl Zone {
    /// Creates a zone without contents, opening its journal if one is
    /// configured. Call [`Zone::load`] to load the contents.
    pub fn new(name: Name, config: ZoneConfig) -> Result<Self, Error> {
        let journal = config
            .journal
            .as_ref()
            .map(|path| Journal::open(path, config.journal_max_size))
            .transpose()?;
        Ok(Self {
            name,
            zone_file: config.zone_file,
            zonefile_sync: config.zonefile_sync,
            serial_policy: config.serial_policy,
            contents: ArcSwapOption::empty(),
            control_update: Mutex::new(None),
            journal,
            signer: None,
            sync: Mutex::new(SyncState::default()),
            flags: AtomicU32::new(0),
            ddns_queue: Mutex::new(VecDeque::new()),
            acls: ArcSwap::from_pointee(config.acls),
            masters: Mutex::new(config.masters),
            events: ZoneEvents::default(),
        })
    }

    /// Sets the collaborator used for DNSSEC signing.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the published contents, if any.
    pub fn contents(&self) -> Option<Arc<Contents>> {
        self.contents.load_full()
    }

    /// Returns the serial of the published contents.
    pub fn serial(&self) -> Option<Serial> {
        self.contents.load().as_ref().and_then(|c| c.serial())
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    pub fn events(&self) -> &ZoneEvents {
        &self.events
    }

    pub fn signing_enabled(&self) -> bool {
        self.signer.is_some()
    }

    /// Returns the serial and modification time of the zone file as
    /// last read or written.
    pub fn zone_file_state(&self) -> (Option<Serial>, Option<SystemTime>) {
        let sync = self.sync();
        (sync.serial, sync.mtime)
    }

    ////////////////////////////////////////////////////////////////////
    // TRANSACTIONS                                                   //
    ////////////////////////////////////////////////////////////////////

    /// Opens a transaction. It is incremental if the zone has contents
    /// and full otherwise. Fails immediately if a transaction is
    /// already open.
    pub fn begin(&self, flags: UpdateFlags) -> Result<UpdateMode, Error> {
        let mut slot = self.control_update();
        if slot.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let update = match self.contents.load_full() {
            Some(base) if !base.is_empty() => ZoneUpdate::incremental(base, flags),
            _ => ZoneUpdate::full(self.name.clone(), None, flags),
        };
        let mode = update.mode();
        *slot = Some(update);
        debug!("Zone {}: opened a {} transaction", self.name, mode);
        Ok(mode)
    }

    /// Runs `f` on the open transaction.
    pub fn update<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut ZoneUpdate) -> Result<R, Error>,
    {
        let mut slot = self.control_update();
        let update = slot.as_mut().ok_or(Error::NotOpen)?;
        f(update)
    }

    pub fn has_open_update(&self) -> bool {
        self.control_update().is_some()
    }

    /// Discards the open transaction.
    pub fn abort(&self) -> Result<(), Error> {
        self.control_update()
            .take()
            .map(|_| debug!("Zone {}: aborted the transaction", self.name))
            .ok_or(Error::NotOpen)
    }

    /// Commits the open transaction, returning the new serial (or
    /// `None` if the transaction changed nothing).
    ///
    /// The transaction is closed whether or not the commit succeeds. If
    /// it fails, the published contents are untouched.
    pub fn commit(&self) -> Result<Option<Serial>, Error> {
        let mut slot = self.control_update();
        let update = slot.take().ok_or(Error::NotOpen)?;
        // The slot stays locked until the commit is done, so that no
        // new transaction starts from the old contents.
        let result = self.commit_update(update);
        drop(slot);
        result
    }

    fn commit_update(&self, update: ZoneUpdate) -> Result<Option<Serial>, Error> {
        let finished = match update.finish(self.serial_policy, self.signer.as_deref())? {
            Some(finished) => finished,
            None => {
                debug!("Zone {}: nothing to commit", self.name);
                return Ok(None);
            }
        };
        self.store_changeset(&finished.changeset)?;

        let serial = finished.contents.serial();
        self.contents.store(Some(Arc::new(finished.contents)));
        self.clear_flag(ZoneFlag::Expired);
        match serial {
            Some(serial) => info!("Zone {}: committed serial {}", self.name, serial),
            None => info!("Zone {}: committed", self.name),
        }

        self.events.schedule_now(EventType::Notify);
        let needs_flush = self.journal.as_ref().map_or(false, Journal::needs_flush);
        if self.zonefile_sync == 0 || needs_flush {
            self.events.schedule_now(EventType::Flush);
        } else if self.zonefile_sync > 0 {
            let delay = Duration::from_secs(self.zonefile_sync as u64);
            self.events.schedule(EventType::Flush, Instant::now() + delay);
        }
        Ok(serial)
    }

    /// Appends `changeset` to the journal. If the journal is full, the
    /// zone file is flushed (so that synced entries can be discarded)
    /// and the append is tried once more.
    fn store_changeset(&self, changeset: &Changeset) -> Result<(), Error> {
        let journal = match self.journal {
            Some(ref journal) => journal,
            None => return Ok(()),
        };
        match journal.append(changeset) {
            Err(journal::Error::Full) => {
                warn!("Zone {}: the journal is full, flushing the zone file", self.name);
                if let Err(err) = self.flush_journal(true) {
                    warn!("Zone {}: failed to flush the zone file: {}", self.name, err);
                    return Err(Error::JournalFull);
                }
                journal.append(changeset).map_err(Error::from)
            }
            result => result.map_err(Error::from),
        }
    }

    ////////////////////////////////////////////////////////////////////
    // LOADING, FLUSHING, AND EXPIRATION                              //
    ////////////////////////////////////////////////////////////////////

    /// Loads the zone from its zone file and brings it up to date with
    /// the journal. Without a zone file, the zone is recovered from the
    /// journal alone if the journal starts with a full replacement.
    pub fn load(&self) -> Result<(), Error> {
        let contents = match self.zone_file {
            Some(ref path) if path.exists() => {
                let (contents, mtime) = zone_file::read(path, &self.name)?;
                let serial = contents.serial().ok_or(Error::NoContent)?;
                *self.sync() = SyncState {
                    serial: Some(serial),
                    mtime: Some(mtime),
                };
                info!(
                    "Zone {}: loaded serial {} from {}",
                    self.name,
                    serial,
                    path.display()
                );
                self.replay_journal(contents, serial)?
            }
            _ => match self.journal {
                Some(ref journal) if journal.starts_with_full_replacement() => {
                    let mut contents = Contents::new(self.name.clone());
                    for changeset in journal.replay_all()? {
                        contents = contents.apply_changeset(&changeset)?;
                    }
                    info!("Zone {}: recovered from the journal", self.name);
                    contents
                }
                _ if self.is_slave() => {
                    info!("Zone {}: no local data, scheduling a transfer", self.name);
                    self.events.schedule_now(EventType::Transfer);
                    return Ok(());
                }
                _ => return Err(Error::NoContent),
            },
        };

        self.contents.store(Some(Arc::new(contents)));
        self.clear_flag(ZoneFlag::Expired);
        if self.is_slave() {
            self.events.schedule_now(EventType::Refresh);
        }
        Ok(())
    }

    fn replay_journal(&self, mut contents: Contents, serial: Serial) -> Result<Contents, Error> {
        let journal = match self.journal {
            Some(ref journal) => journal,
            None => return Ok(contents),
        };
        match journal.replay_from(serial) {
            Ok(changesets) => {
                for changeset in changesets.iter() {
                    contents = contents.apply_changeset(changeset)?;
                }
                if !changesets.is_empty() {
                    info!(
                        "Zone {}: replayed {} changesets from the journal",
                        self.name,
                        changesets.len()
                    );
                }
                Ok(contents)
            }
            Err(journal::Error::SerialNotFound(_)) => {
                if !journal.is_empty() {
                    warn!(
                        "Zone {}: the journal does not continue from serial {}, discarding it",
                        self.name, serial
                    );
                }
                journal.clear(Some(serial))?;
                Ok(contents)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the published contents to the zone file and marks the
    /// journal as synced. Does nothing if the zone file already holds
    /// the current serial (or a newer one), unless `force` is set.
    pub fn flush_journal(&self, force: bool) -> Result<(), Error> {
        let path = self.zone_file.as_ref().ok_or(Error::NotSupported)?;

        // The sync lock is held from loading the snapshot until the
        // journal is marked, so that concurrent flushes cannot write an
        // older snapshot over a newer one.
        let mut sync = self.sync();
        let contents = self.contents.load_full().ok_or(Error::NoContent)?;
        let serial = contents.serial().ok_or(Error::NoContent)?;
        if !force && path.exists() {
            if let Some(synced) = sync.serial {
                if synced == serial || synced.is_newer_than(serial) {
                    debug!("Zone {}: the zone file is up to date", self.name);
                    return Ok(());
                }
            }
        }
        let mtime = zone_file::write(path, &contents)?;
        *sync = SyncState {
            serial: Some(serial),
            mtime: Some(mtime),
        };

        if let Some(ref journal) = self.journal {
            journal.mark_synced(serial)?;
        }
        drop(sync);
        info!(
            "Zone {}: flushed serial {} to {}",
            self.name,
            serial,
            path.display()
        );
        Ok(())
    }

    /// Flushes the zone file, honouring [`ZoneFlag::ForceFlush`].
    pub fn flush(&self) -> Result<(), Error> {
        let force = self.take_flag(ZoneFlag::ForceFlush);
        self.flush_journal(force)
    }

    /// Signs the zone in a transaction of its own.
    pub fn resign(&self) -> Result<(), Error> {
        if self.signer.is_none() {
            return Err(Error::NotSupported);
        }
        self.take_flag(ZoneFlag::ForceResign);
        self.begin(UpdateFlags {
            sign: true,
            strict: false,
        })?;
        self.commit().map(|_| ())
    }

    /// Stops serving the zone's contents.
    pub fn expire(&self) {
        self.set_flag(ZoneFlag::Expired);
        self.contents.store(None);
        info!("Zone {}: expired", self.name);
    }

    pub fn is_expired(&self) -> bool {
        self.has_flag(ZoneFlag::Expired)
    }

    /// Discards everything the zone holds: the open transaction, the
    /// contents, the zone file, the journal entries, the pending
    /// events, and queued dynamic updates.
    pub fn purge(&self) -> Result<(), Error> {
        self.control_update().take();
        self.expire();
        self.events.cancel_all();
        self.ddns_queue().clear();
        if let Some(ref path) = self.zone_file {
            match fs::remove_file(path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => {
                    return Err(zone_file::Error::Io(err).into());
                }
                _ => (),
            }
        }
        *self.sync() = SyncState::default();
        if let Some(ref journal) = self.journal {
            journal.clear(None)?;
        }
        info!("Zone {}: purged", self.name);
        Ok(())
    }

    /// Runs `event` if it is carried out by the zone itself. Returns
    /// `false` for events that belong to external collaborators
    /// (transfers, NOTIFY, and dynamic update processing).
    pub fn run_event(&self, event: EventType) -> Result<bool, Error> {
        match event {
            EventType::Load => self.load(),
            EventType::Flush => self.flush(),
            EventType::Expire => {
                self.expire();
                Ok(())
            }
            EventType::Dnssec => self.resign(),
            EventType::Refresh | EventType::Transfer | EventType::Notify | EventType::Update => {
                return Ok(false);
            }
        }
        .map(|()| true)
    }

    ////////////////////////////////////////////////////////////////////
    // FLAGS                                                          //
    ////////////////////////////////////////////////////////////////////

    pub fn set_flag(&self, flag: ZoneFlag) {
        self.flags.fetch_or(flag.bit(), Ordering::SeqCst);
    }

    pub fn clear_flag(&self, flag: ZoneFlag) {
        self.flags.fetch_and(!flag.bit(), Ordering::SeqCst);
    }

    pub fn has_flag(&self, flag: ZoneFlag) -> bool {
        self.flags.load(Ordering::SeqCst) & flag.bit() != 0
    }

    /// Clears `flag`, returning whether it was set.
    pub fn take_flag(&self, flag: ZoneFlag) -> bool {
        self.flags.fetch_and(!flag.bit(), Ordering::SeqCst) & flag.bit() != 0
    }

    ////////////////////////////////////////////////////////////////////
    // DYNAMIC UPDATES, ACLS, AND MASTERS                             //
    ////////////////////////////////////////////////////////////////////

    /// Queues a dynamic update request and schedules its processing.
    pub fn enqueue_update(&self, request: UpdateRequest) {
        self.ddns_queue().push_back(request);
        self.events.schedule_now(EventType::Update);
    }

    /// Takes the oldest queued dynamic update request.
    pub fn dequeue_update(&self) -> Option<UpdateRequest> {
        self.ddns_queue().pop_front()
    }

    pub fn update_queue_len(&self) -> usize {
        self.ddns_queue().len()
    }

    pub fn acls(&self) -> Arc<ZoneAcls> {
        self.acls.load_full()
    }

    pub fn set_acls(&self, acls: ZoneAcls) {
        self.acls.store(Arc::new(acls));
    }

    pub fn is_slave(&self) -> bool {
        !self.masters().is_empty()
    }

    /// Returns the master to contact next.
    pub fn master(&self) -> Option<SocketAddr> {
        self.masters().first().copied()
    }

    /// Moves the current master to the end of the list, e.g. after it
    /// failed to respond.
    pub fn rotate_masters(&self) {
        let mut masters = self.masters();
        if !masters.is_empty() {
            masters.rotate_left(1);
        }
    }

    pub fn set_masters(&self, masters: Vec<SocketAddr>) {
        *self.masters() = masters;
    }

    /// Returns whether a master advertising `remote` has data newer
    /// than ours.
    pub fn transfer_needed(&self, remote: Serial) -> bool {
        if self.is_expired() {
            return true;
        }
        match self.serial() {
            Some(local) => remote.is_newer_than(local),
            None => true,
        }
    }

    ////////////////////////////////////////////////////////////////////
    // LOCKING HELPERS                                                //
    ////////////////////////////////////////////////////////////////////

    fn control_update(&self) -> MutexGuard<Option<ZoneUpdate>> {
        self.control_update.lock().unwrap()
    }

    fn sync(&self) -> MutexGuard<SyncState> {
        self.sync.lock().unwrap()
    }

    fn ddns_queue(&self) -> MutexGuard<VecDeque<UpdateRequest>> {
        self.ddns_queue.lock().unwrap()
    }

    fn masters(&self) -> MutexGuard<Vec<SocketAddr>> {
        self.masters.lock().unwrap()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
