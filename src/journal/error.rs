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

//! Implementation of the [`Error`] type for journal errors.

use std::fmt;
use std::io;

use crate::rr::Serial;

/// Errors that arise during journal operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(io::Error),

    /// The journal file is not a journal, or its header is damaged.
    Corrupt(&'static str),

    /// The changeset does not fit within the journal's size limit,
    /// even after discarding entries already synced to the zone file.
    Full,

    /// The changeset does not start at the journal's last serial.
    Discontinuity { expected: Serial, found: Serial },

    /// The changeset lacks the SOA serials needed to journal it.
    MissingSerial,

    /// No journal entry starts at the requested serial.
    SerialNotFound(Serial),

    /// A changeset could not be encoded.
    Encode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Corrupt(msg) => write!(f, "corrupt journal: {}", msg),
            Self::Full => f.write_str("journal is full"),
            Self::Discontinuity { expected, found } => write!(
                f,
                "changeset starts at serial {} but the journal ends at serial {}",
                found, expected
            ),
            Self::MissingSerial => f.write_str("changeset lacks SOA serials"),
            Self::SerialNotFound(serial) => {
                write!(f, "no journal entry starts at serial {}", serial)
            }
            Self::Encode(msg) => write!(f, "failed to encode changeset: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
