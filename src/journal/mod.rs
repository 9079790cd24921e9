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

//! Implementation of [`Journal`], the durable log of a zone's
//! changesets.
//!
//! # File format
//!
//! A journal file starts with a 16-octet header:
//!
//! | Octets | Contents                                          |
//! |--------|---------------------------------------------------|
//! | 0–3    | the magic `ALMJ`                                  |
//! | 4–5    | format version (1), big endian                    |
//! | 6–7    | flags; bit 0 is set if the synced serial is valid |
//! | 8–11   | the serial last synced to the zone file           |
//! | 12–15  | reserved (zero)                                   |
//!
//! The header is followed by entries, each framed as a 32-bit big
//! endian payload length, the first 8 octets of the SHA-256 digest of
//! the payload, and the payload itself: one CBOR-encoded
//! [`Changeset`]. Entries are contiguous: each starts at the serial the
//! previous one ended at. Only the first entry may be a full
//! replacement changeset.
//!
//! Entries are only ever appended, so a crash can at worst leave a
//! partially-written final entry behind. Such a torn entry fails its
//! length or checksum check, and [`Journal::open`] cuts it off.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::rr::Serial;
use crate::zone::Changeset;

mod error;
pub use error::Error;

const MAGIC: &[u8; 4] = b"ALMJ";
const VERSION: u16 = 1;
const HEADER_LEN: u64 = 16;
const FRAME_HEADER_LEN: u64 = 12;
const CHECKSUM_LEN: usize = 8;
const FLAG_SYNCED: u16 = 1;

////////////////////////////////////////////////////////////////////////
// JOURNAL                                                            //
////////////////////////////////////////////////////////////////////////

/// A size-bounded, append-only log of a zone's changesets, stored in a
/// single file.
///
/// The journal remembers the serial that was last written to the zone
/// file (see [`Journal::mark_synced`]). Entries up to that serial are
/// redundant, and they are the only entries ever discarded: when an
/// append would exceed the size limit, the journal first compacts away
/// synced entries, and if that is not enough, the append fails with
/// [`Error::Full`]. It is then up to the zone to flush itself to its
/// zone file, mark the journal synced, and try again.
///
/// All operations lock the journal internally. Readers see the journal
/// either before or after a concurrent append, never in between.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    max_size: u64,
    state: RwLock<State>,
}

#[derive(Debug)]
struct State {
    file: File,
    synced: Option<Serial>,
    entries: Vec<Entry>,
    len: u64,
}

/// The index of an entry, kept in memory so that the payload need not
/// be decoded until it is replayed.
#[derive(Clone, Copy, Debug)]
struct Entry {
    offset: u64,
    frame_len: u64,

    /// The serial the changeset starts at; `None` for a full
    /// replacement.
    from: Option<Serial>,
    to: Serial,
}

impl Journal {
    /// Opens the journal at `path`, creating it if it does not exist.
    /// A `max_size` of zero means that the journal is unbounded.
    ///
    /// Damaged entries at the end of the file are discarded.
    pub fn open(path: impl AsRef<Path>, max_size: u64) -> Result<Self, Error> {
        let path = path.as_ref().to_owned();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let mut file_len = file.metadata()?.len();

        // A file too short to hold the header was cut off while it was
        // being created, so it holds nothing worth keeping.
        let synced = if file_len < HEADER_LEN {
            if file_len > 0 {
                warn!(
                    "Journal {} has a truncated header, starting it afresh",
                    path.display()
                );
                file.set_len(0)?;
            }
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&encode_header(None))?;
            file.sync_all()?;
            file_len = HEADER_LEN;
            None
        } else {
            let mut header = [0; HEADER_LEN as usize];
            file.read_exact(&mut header)?;
            decode_header(&header)?
        };

        let (entries, len) = scan(&file)?;
        if len < file_len {
            warn!(
                "Discarding {} octets of damaged entries at the end of journal {}",
                file_len - len,
                path.display()
            );
            file.set_len(len)?;
            file.sync_all()?;
        }
        debug!(
            "Opened journal {} with {} entries ({} octets)",
            path.display(),
            entries.len(),
            len
        );

        Ok(Self {
            path,
            max_size,
            state: RwLock::new(State {
                file,
                synced,
                entries,
                len: len.max(HEADER_LEN),
            }),
        })
    }

    /// Appends `changeset` to the journal. The changeset is on stable
    /// storage when this returns successfully.
    ///
    /// An incremental changeset must start at the serial the journal
    /// ends at (or, for an empty journal, at the synced serial, if one
    /// is known). A full replacement changeset replaces the whole
    /// journal.
    pub fn append(&self, changeset: &Changeset) -> Result<(), Error> {
        let to = changeset.to_serial().ok_or(Error::MissingSerial)?;
        let from = if changeset.is_full_replacement() {
            None
        } else {
            Some(changeset.from_serial().ok_or(Error::MissingSerial)?)
        };
        let frame = encode_frame(changeset)?;
        let frame_len = frame.len() as u64;
        let mut state = self.write();

        let from = match from {
            Some(from) => from,
            None => return self.reset(&mut state, &frame, to),
        };
        let expected = state.entries.last().map(|e| e.to).or(state.synced);
        if let Some(expected) = expected {
            if expected != from {
                return Err(Error::Discontinuity {
                    expected,
                    found: from,
                });
            }
        }

        if self.exceeds(state.len + frame_len) {
            self.compact(&mut state)?;
            if self.exceeds(state.len + frame_len) {
                return Err(Error::Full);
            }
        }

        let offset = state.len;
        if let Err(err) = write_frame_at(&mut state.file, offset, &frame) {
            // Leave no partial entry behind for the next open to find.
            if let Err(truncate_err) = state.file.set_len(offset) {
                warn!(
                    "Failed to cut a partial entry off journal {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(err.into());
        }
        state.entries.push(Entry {
            offset,
            frame_len,
            from: Some(from),
            to,
        });
        state.len += frame_len;
        Ok(())
    }

    /// Records that the zone file now holds the zone at `serial`. The
    /// entries up to `serial` become eligible for compaction.
    pub fn mark_synced(&self, serial: Serial) -> Result<(), Error> {
        let mut state = self.write();
        state.file.seek(SeekFrom::Start(0))?;
        state.file.write_all(&encode_header(Some(serial)))?;
        state.file.sync_data()?;
        state.synced = Some(serial);
        Ok(())
    }

    /// Discards every entry, leaving `synced` as the synced serial.
    pub fn clear(&self, synced: Option<Serial>) -> Result<(), Error> {
        let mut state = self.write();
        state.file = rewrite(&self.path, &encode_header(synced))?;
        state.synced = synced;
        state.entries.clear();
        state.len = HEADER_LEN;
        Ok(())
    }

    /// Reads the changesets that lead from `serial` to the end of the
    /// journal. The result is empty if the journal ends at `serial`.
    pub fn replay_from(&self, serial: Serial) -> Result<Vec<Changeset>, Error> {
        let state = self.read();
        if state.entries.last().map(|e| e.to) == Some(serial) {
            return Ok(Vec::new());
        }
        let start = state
            .entries
            .iter()
            .position(|e| e.from == Some(serial))
            .ok_or(Error::SerialNotFound(serial))?;
        self.read_entries(&state.entries[start..])
    }

    /// Reads every changeset in the journal.
    pub fn replay_all(&self) -> Result<Vec<Changeset>, Error> {
        let state = self.read();
        self.read_entries(&state.entries)
    }

    /// Returns whether the journal holds no entries.
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Returns the size of the journal file in octets.
    pub fn size(&self) -> u64 {
        self.read().len
    }

    /// Returns the serial the first entry starts at. `None` if the
    /// journal is empty or starts with a full replacement.
    pub fn first_serial(&self) -> Option<Serial> {
        self.read().entries.first().and_then(|e| e.from)
    }

    /// Returns whether the first entry is a full replacement.
    pub fn starts_with_full_replacement(&self) -> bool {
        self.read()
            .entries
            .first()
            .map_or(false, |e| e.from.is_none())
    }

    /// Returns the serial the last entry ends at.
    pub fn last_serial(&self) -> Option<Serial> {
        self.read().entries.last().map(|e| e.to)
    }

    /// Returns the serial last synced to the zone file.
    pub fn synced_serial(&self) -> Option<Serial> {
        self.read().synced
    }

    /// Returns whether the zone should be flushed to its zone file
    /// soon: the journal has unsynced entries and is more than half
    /// full.
    pub fn needs_flush(&self) -> bool {
        let state = self.read();
        let unsynced = state
            .entries
            .last()
            .map_or(false, |e| Some(e.to) != state.synced);
        unsynced && self.max_size != 0 && state.len > self.max_size / 2
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    ////////////////////////////////////////////////////////////////////
    // HELPERS                                                        //
    ////////////////////////////////////////////////////////////////////

    fn exceeds(&self, len: u64) -> bool {
        self.max_size != 0 && len > self.max_size
    }

    /// Replaces the journal with one holding only the full replacement
    /// `frame`.
    fn reset(&self, state: &mut State, frame: &[u8], to: Serial) -> Result<(), Error> {
        let len = HEADER_LEN + frame.len() as u64;
        if self.exceeds(len) {
            return Err(Error::Full);
        }
        let mut contents = encode_header(None).to_vec();
        contents.extend_from_slice(frame);
        state.file = rewrite(&self.path, &contents)?;
        state.synced = None;
        state.entries = vec![Entry {
            offset: HEADER_LEN,
            frame_len: frame.len() as u64,
            from: None,
            to,
        }];
        state.len = len;
        info!("Reset journal {} with a full replacement", self.path.display());
        Ok(())
    }

    /// Discards the entries up to the synced serial.
    fn compact(&self, state: &mut State) -> Result<(), Error> {
        let keep_from = match state.entries.iter().position(|e| Some(e.to) == state.synced) {
            Some(index) => index + 1,
            None => return Ok(()),
        };
        let cut = state
            .entries
            .get(keep_from)
            .map_or(state.len, |e| e.offset);

        let mut contents = encode_header(state.synced).to_vec();
        state.file.seek(SeekFrom::Start(cut))?;
        (&state.file).take(state.len - cut).read_to_end(&mut contents)?;
        state.file = rewrite(&self.path, &contents)?;

        let shift = cut - HEADER_LEN;
        state.entries.drain(..keep_from);
        for entry in state.entries.iter_mut() {
            entry.offset -= shift;
        }
        state.len -= shift;
        info!(
            "Compacted journal {}, discarding {} octets of synced entries",
            self.path.display(),
            shift
        );
        Ok(())
    }

    fn read_entries(&self, entries: &[Entry]) -> Result<Vec<Changeset>, Error> {
        let mut file = File::open(&self.path)?;
        entries
            .iter()
            .map(|entry| {
                file.seek(SeekFrom::Start(entry.offset + FRAME_HEADER_LEN))?;
                let mut payload = vec![0; (entry.frame_len - FRAME_HEADER_LEN) as usize];
                file.read_exact(&mut payload)?;
                ciborium::from_reader(&payload[..]).or(Err(Error::Corrupt("undecodable entry")))
            })
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<State> {
        self.state.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<State> {
        self.state.write().unwrap()
    }
}

////////////////////////////////////////////////////////////////////////
// ENCODING AND DECODING                                              //
////////////////////////////////////////////////////////////////////////

fn encode_header(synced: Option<Serial>) -> [u8; HEADER_LEN as usize] {
    let mut header = [0; HEADER_LEN as usize];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_be_bytes());
    if let Some(serial) = synced {
        header[6..8].copy_from_slice(&FLAG_SYNCED.to_be_bytes());
        header[8..12].copy_from_slice(&u32::from(serial).to_be_bytes());
    }
    header
}

fn decode_header(header: &[u8; HEADER_LEN as usize]) -> Result<Option<Serial>, Error> {
    if &header[0..4] != MAGIC {
        return Err(Error::Corrupt("bad magic"));
    } else if u16::from_be_bytes([header[4], header[5]]) != VERSION {
        return Err(Error::Corrupt("unsupported version"));
    }
    let flags = u16::from_be_bytes([header[6], header[7]]);
    if flags & FLAG_SYNCED != 0 {
        let serial = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        Ok(Some(Serial::from(serial)))
    } else {
        Ok(None)
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut checksum = [0; CHECKSUM_LEN];
    checksum.copy_from_slice(&digest[..CHECKSUM_LEN]);
    checksum
}

fn encode_frame(changeset: &Changeset) -> Result<Vec<u8>, Error> {
    let mut payload = Vec::new();
    ciborium::into_writer(changeset, &mut payload).map_err(|e| Error::Encode(e.to_string()))?;
    let len = u32::try_from(payload.len()).or(Err(Error::Encode("changeset is too large".into())))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN as usize + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&checksum(&payload));
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Scans the entries following the header. Returns the index of the
/// intact entries and the length of the file they occupy.
fn scan(file: &File) -> Result<(Vec<Entry>, u64), Error> {
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(HEADER_LEN))?;
    let mut entries: Vec<Entry> = Vec::new();
    let mut offset = HEADER_LEN;

    loop {
        let mut frame_header = [0; FRAME_HEADER_LEN as usize];
        if !read_fully(&mut reader, &mut frame_header)? {
            break;
        }
        let len = u32::from_be_bytes([
            frame_header[0],
            frame_header[1],
            frame_header[2],
            frame_header[3],
        ]);
        let mut payload = vec![0; len as usize];
        if !read_fully(&mut reader, &mut payload)? || frame_header[4..] != checksum(&payload) {
            break;
        }
        let changeset: Changeset = match ciborium::from_reader(&payload[..]) {
            Ok(changeset) => changeset,
            Err(_) => break,
        };

        let (from, to) = match (
            changeset.is_full_replacement(),
            changeset.from_serial(),
            changeset.to_serial(),
        ) {
            (true, _, Some(to)) if entries.is_empty() => (None, to),
            (false, Some(from), Some(to)) => (Some(from), to),
            _ => break,
        };
        if let (Some(previous), Some(from)) = (entries.last(), from) {
            if previous.to != from {
                break;
            }
        }

        let frame_len = FRAME_HEADER_LEN + len as u64;
        entries.push(Entry {
            offset,
            frame_len,
            from,
            to,
        });
        offset += frame_len;
    }
    Ok((entries, offset))
}

/// Fills `buf`, returning `false` if the end of the file came first.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool, Error> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn write_frame_at(file: &mut File, offset: u64, frame: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(frame)?;
    file.sync_data()
}

/// Atomically replaces the file at `path` with `contents`: the data is
/// written to a temporary file, synced, and renamed into place. Returns
/// the replaced file, opened for reading and writing.
fn rewrite(path: &Path, contents: &[u8]) -> Result<File, Error> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    {
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(contents)?;
        tmp_file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use lazy_static::lazy_static;
    use tempfile::TempDir;

    use super::*;
    use crate::name::Name;
    use crate::rr::{Record, Ttl};
    use crate::zone::Contents;

    lazy_static! {
        static ref APEX: Name = "almanac.test.".parse().unwrap();
    }

    /// Returns zone contents at `serial`, holding `hosts` A records.
    fn version(serial: u32, hosts: usize) -> Contents {
        let mut contents = Contents::new(APEX.clone());
        let soa = format!("@ SOA ns hostmaster {} 3600 900 604800 300", serial);
        let mut lines = vec![soa, "@ NS ns".to_owned()];
        for i in 0..hosts {
            lines.push(format!("host{} A 192.0.2.{}", i, i % 250));
        }
        for line in lines {
            let record = Record::parse(&line, &APEX, Some(Ttl::from(3600))).unwrap();
            contents.add_record(&record).unwrap();
        }
        contents
    }

    fn step(serial: u32) -> Changeset {
        Changeset::diff(
            &version(serial, serial as usize),
            &version(serial + 1, serial as usize + 1),
        )
    }

    fn journal_path(dir: &TempDir) -> PathBuf {
        dir.path().join("almanac.test.journal")
    }

    #[test]
    fn append_and_replay_work() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        assert!(journal.is_empty());
        for serial in 1..4 {
            journal.append(&step(serial)).unwrap();
        }
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.first_serial(), Some(Serial::from(1)));
        assert_eq!(journal.last_serial(), Some(Serial::from(4)));

        let replayed = journal.replay_from(Serial::from(2)).unwrap();
        assert_eq!(replayed, [step(2), step(3)]);
        assert!(journal.replay_from(Serial::from(4)).unwrap().is_empty());
        assert!(matches!(
            journal.replay_from(Serial::from(9)),
            Err(Error::SerialNotFound(_)),
        ));
    }

    #[test]
    fn append_rejects_discontinuity() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        journal.append(&step(1)).unwrap();
        assert!(matches!(
            journal.append(&step(3)),
            Err(Error::Discontinuity { .. }),
        ));
        assert!(matches!(
            journal.append(&Changeset::default()),
            Err(Error::MissingSerial),
        ));
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let journal = Journal::open(journal_path(&dir), 0).unwrap();
            journal.append(&step(1)).unwrap();
            journal.append(&step(2)).unwrap();
            journal.mark_synced(Serial::from(2)).unwrap();
        }
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.synced_serial(), Some(Serial::from(2)));
        assert_eq!(journal.replay_all().unwrap(), [step(1), step(2)]);
    }

    #[test]
    fn torn_tail_is_discarded_on_open() {
        let dir = TempDir::new().unwrap();
        let size_after_first;
        {
            let journal = Journal::open(journal_path(&dir), 0).unwrap();
            journal.append(&step(1)).unwrap();
            size_after_first = journal.size();
            journal.append(&step(2)).unwrap();
        }
        let file = OpenOptions::new()
            .write(true)
            .open(journal_path(&dir))
            .unwrap();
        let full_len = file.metadata().unwrap().len();
        file.set_len(full_len - 3).unwrap();
        drop(file);

        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.size(), size_after_first);
        assert_eq!(
            fs::metadata(journal_path(&dir)).unwrap().len(),
            size_after_first
        );
        journal.append(&step(2)).unwrap();
        assert_eq!(journal.last_serial(), Some(Serial::from(3)));
    }

    #[test]
    fn corrupt_checksum_is_discarded_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let journal = Journal::open(journal_path(&dir), 0).unwrap();
            journal.append(&step(1)).unwrap();
        }
        let mut bytes = fs::read(journal_path(&dir)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(journal_path(&dir), &bytes).unwrap();
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        assert!(journal.is_empty());
    }

    #[test]
    fn open_rejects_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(journal_path(&dir), b"this is not a journal file").unwrap();
        assert!(matches!(
            Journal::open(journal_path(&dir), 0),
            Err(Error::Corrupt("bad magic")),
        ));
    }

    #[test]
    fn short_header_starts_afresh() {
        let dir = TempDir::new().unwrap();
        fs::write(journal_path(&dir), &MAGIC[..3]).unwrap();
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        assert!(journal.is_empty());
        assert_eq!(journal.synced_serial(), None);
        assert_eq!(fs::read(journal_path(&dir)).unwrap(), encode_header(None));

        journal.append(&step(1)).unwrap();
        drop(journal);
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        assert_eq!(journal.replay_all().unwrap(), [step(1)]);
    }

    #[test]
    fn readers_see_whole_entries_during_appends() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        let steps: Vec<Changeset> = (1..=20).map(step).collect();
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            let reader = s.spawn(|| loop {
                let finished = done.load(Ordering::SeqCst);
                let replayed = journal.replay_all().unwrap();
                assert_eq!(replayed[..], steps[..replayed.len()]);
                match journal.last_serial() {
                    Some(last) => assert!((2..=21).contains(&u32::from(last))),
                    None => assert!(replayed.is_empty()),
                }
                if finished {
                    break replayed.len();
                }
            });
            for changeset in &steps {
                journal.append(changeset).unwrap();
            }
            done.store(true, Ordering::SeqCst);
            assert_eq!(reader.join().unwrap(), steps.len());
        });
    }

    #[test]
    fn full_journal_compacts_synced_entries() {
        let dir = TempDir::new().unwrap();
        let frame_len = encode_frame(&step(1)).unwrap().len() as u64;
        let max_size = HEADER_LEN + 2 * frame_len + frame_len / 2;
        let journal = Journal::open(journal_path(&dir), max_size).unwrap();
        journal.append(&step(1)).unwrap();
        journal.append(&step(2)).unwrap();
        assert!(journal.needs_flush());

        // Nothing is synced, so nothing can be discarded.
        let before = fs::read(journal_path(&dir)).unwrap();
        assert!(matches!(journal.append(&step(3)), Err(Error::Full)));
        assert_eq!(fs::read(journal_path(&dir)).unwrap(), before);

        journal.mark_synced(Serial::from(3)).unwrap();
        assert!(!journal.needs_flush());
        journal.append(&step(3)).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.first_serial(), Some(Serial::from(3)));
        assert_eq!(journal.replay_from(Serial::from(3)).unwrap(), [step(3)]);

        // The compacted file reopens cleanly.
        drop(journal);
        let journal = Journal::open(journal_path(&dir), max_size).unwrap();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.synced_serial(), Some(Serial::from(3)));
    }

    #[test]
    fn full_replacement_resets_journal() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        journal.append(&step(1)).unwrap();
        journal.mark_synced(Serial::from(2)).unwrap();
        let full = Changeset::full_replacement(&version(100, 3));
        journal.append(&full).unwrap();
        assert_eq!(journal.len(), 1);
        assert!(journal.starts_with_full_replacement());
        assert_eq!(journal.synced_serial(), None);
        assert_eq!(journal.last_serial(), Some(Serial::from(100)));
        assert_eq!(journal.replay_all().unwrap(), [full]);

        // Incremental entries may follow.
        let next = Changeset::diff(&version(100, 3), &version(101, 4));
        journal.append(&next).unwrap();
        assert_eq!(journal.replay_all().unwrap().len(), 2);
    }

    #[test]
    fn clear_discards_entries() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(journal_path(&dir), 0).unwrap();
        journal.append(&step(1)).unwrap();
        journal.clear(Some(Serial::from(7))).unwrap();
        assert!(journal.is_empty());
        assert_eq!(journal.size(), HEADER_LEN);
        assert!(matches!(
            journal.append(&step(1)),
            Err(Error::Discontinuity { .. }),
        ));
        journal.append(&step(7)).unwrap();
        assert_eq!(journal.len(), 1);
    }
}
