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

//! Error types for the control surface.

use std::fmt;
use std::io;

use crate::zone;
use crate::zone_file;

////////////////////////////////////////////////////////////////////////
// COMMAND ERRORS                                                     //
////////////////////////////////////////////////////////////////////////

/// The errors that a control command reports to its client. The
/// [`Display`](fmt::Display) output of each is the text sent in the
/// `error` field of the response.
#[derive(Debug)]
pub enum Error {
    NoSuchZone,
    TransactionExists,
    NoTransaction,
    InvalidArgument,
    OutOfSpace,
    ParseFailure,
    TtlNotResolvable,
    NotFound,
    JournalFull,
    SemanticCheck,
    NotSupported,
    Io,
    NoContent,

    /// Any other failure of a zone operation, described by its message.
    Failed(String),

    /// The control channel failed. This ends the session.
    Channel(ChannelError),
}

impl Error {
    /// Returns the channel error that ends the session, if this is one.
    pub(super) fn into_fatal(self) -> Result<Self, ChannelError> {
        match self {
            Self::Channel(err) => Err(err),
            other => Ok(other),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoSuchZone => f.write_str("no such zone"),
            Self::TransactionExists => f.write_str("transaction already exists"),
            Self::NoTransaction => f.write_str("no transaction open"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::OutOfSpace => f.write_str("out of space"),
            Self::ParseFailure => f.write_str("parse failure"),
            Self::TtlNotResolvable => f.write_str("TTL not resolvable"),
            Self::NotFound => f.write_str("not found"),
            Self::JournalFull => f.write_str("journal full"),
            Self::SemanticCheck => f.write_str("semantic check failed"),
            Self::NotSupported => f.write_str("operation not supported"),
            Self::Io => f.write_str("I/O error"),
            Self::NoContent => f.write_str("zone is empty"),
            Self::Failed(msg) => f.write_str(msg),
            Self::Channel(err) => write!(f, "control channel failed: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<zone::Error> for Error {
    fn from(err: zone::Error) -> Self {
        match err {
            zone::Error::NotOpen => Self::NoTransaction,
            zone::Error::AlreadyOpen => Self::TransactionExists,
            zone::Error::InvalidRecord(_) => Self::ParseFailure,
            zone::Error::OutOfZone(_) => Self::InvalidArgument,
            zone::Error::NotFound => Self::NotFound,
            zone::Error::JournalFull => Self::JournalFull,
            zone::Error::ValidationFailed(_) => Self::SemanticCheck,
            zone::Error::TtlNotResolvable => Self::TtlNotResolvable,
            zone::Error::NotSupported => Self::NotSupported,
            zone::Error::NoContent => Self::NoContent,
            zone::Error::Journal(_) => Self::Io,
            zone::Error::ZoneFile(zone_file::Error::Io(_)) => Self::Io,
            zone::Error::ZoneFile(zone_file::Error::Syntax { .. }) => Self::ParseFailure,
            other @ (zone::Error::Inconsistent(_) | zone::Error::Signing(_)) => {
                Self::Failed(other.to_string())
            }
        }
    }
}

/// Sending can run out of space without the channel being broken; the
/// command then fails, but the session goes on.
impl From<ChannelError> for Error {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::OutOfSpace => Self::OutOfSpace,
            other => Self::Channel(other),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// CHANNEL ERRORS                                                     //
////////////////////////////////////////////////////////////////////////

/// Errors reported by a [`Channel`](super::Channel).
#[derive(Debug)]
pub enum ChannelError {
    /// A received unit could not be understood.
    Malformed(String),

    /// A unit was too large to send.
    OutOfSpace,

    /// The underlying transport failed.
    Io(io::Error),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed unit: {}", msg),
            Self::OutOfSpace => f.write_str("out of space"),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
