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

//! Implementation of the [`Error`] type for zone-related errors.

use std::fmt;

use crate::name::Name;
use crate::{journal, rr, zone_file};

/// Errors that arise during operations on a [`Zone`](super::Zone) and
/// its transactions.
#[derive(Debug)]
pub enum Error {
    /// The operation requires an open transaction, but there is none.
    NotOpen,

    /// A transaction was requested while one is already open.
    AlreadyOpen,

    /// A record was malformed.
    InvalidRecord(rr::Error),

    /// A record's owner is not at or below the zone apex.
    OutOfZone(Name),

    /// The owner, RRset, or record to remove does not exist.
    NotFound,

    /// The journal was full, and flushing the zone did not make room.
    JournalFull,

    /// The staged zone failed semantic checks. The messages describe
    /// the errors found.
    ValidationFailed(Vec<String>),

    /// No TTL was given for a record, and none could be inferred.
    TtlNotResolvable,

    /// The operation is not possible for this zone in its current
    /// state (e.g. refreshing a zone that has no masters).
    NotSupported,

    /// The zone has no contents.
    NoContent,

    /// A changeset did not fit the contents it was applied to.
    Inconsistent(&'static str),

    /// DNSSEC signing failed.
    Signing(String),

    /// A journal operation failed.
    Journal(journal::Error),

    /// Reading or writing the zone file failed.
    ZoneFile(zone_file::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotOpen => f.write_str("no transaction is open"),
            Self::AlreadyOpen => f.write_str("a transaction is already open"),
            Self::InvalidRecord(err) => write!(f, "invalid record: {}", err),
            Self::OutOfZone(owner) => write!(f, "{} is not within the zone", owner),
            Self::NotFound => f.write_str("no such data"),
            Self::JournalFull => f.write_str("the journal is full"),
            Self::ValidationFailed(issues) => {
                f.write_str("semantic checks failed")?;
                for (i, issue) in issues.iter().enumerate() {
                    write!(f, "{} {}", if i == 0 { ":" } else { ";" }, issue)?;
                }
                Ok(())
            }
            Self::TtlNotResolvable => f.write_str("the TTL could not be determined"),
            Self::NotSupported => f.write_str("operation not supported"),
            Self::NoContent => f.write_str("the zone has no contents"),
            Self::Inconsistent(msg) => write!(f, "inconsistent changeset: {}", msg),
            Self::Signing(msg) => write!(f, "signing failed: {}", msg),
            Self::Journal(err) => write!(f, "journal error: {}", err),
            Self::ZoneFile(err) => write!(f, "zone file error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRecord(err) => Some(err),
            Self::Journal(err) => Some(err),
            Self::ZoneFile(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rr::Error> for Error {
    fn from(err: rr::Error) -> Self {
        match err {
            rr::Error::MissingTtl => Self::TtlNotResolvable,
            other => Self::InvalidRecord(other),
        }
    }
}

impl From<journal::Error> for Error {
    fn from(err: journal::Error) -> Self {
        match err {
            journal::Error::Full => Self::JournalFull,
            other => Self::Journal(other),
        }
    }
}

impl From<zone_file::Error> for Error {
    fn from(err: zone_file::Error) -> Self {
        Self::ZoneFile(err)
    }
}
