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

//! Implementation of the [`Command`] type.

use std::fmt;
use std::str::FromStr;

/// The commands understood by the control surface.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Command {
    Status,
    Stop,
    Reload,
    ZoneStatus,
    ZoneReload,
    ZoneRefresh,
    ZoneRetransfer,
    ZoneFlush,
    ZoneSign,
    ZoneRead,
    ZoneBegin,
    ZoneCommit,
    ZoneAbort,
    ZoneDiff,
    ZoneGet,
    ZoneSet,
    ZoneUnset,
    ZonePurge,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Self::Status,
        Self::Stop,
        Self::Reload,
        Self::ZoneStatus,
        Self::ZoneReload,
        Self::ZoneRefresh,
        Self::ZoneRetransfer,
        Self::ZoneFlush,
        Self::ZoneSign,
        Self::ZoneRead,
        Self::ZoneBegin,
        Self::ZoneCommit,
        Self::ZoneAbort,
        Self::ZoneDiff,
        Self::ZoneGet,
        Self::ZoneSet,
        Self::ZoneUnset,
        Self::ZonePurge,
    ];

    /// Returns the name by which clients request the command.
    pub fn name(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Stop => "stop",
            Self::Reload => "reload",
            Self::ZoneStatus => "zone-status",
            Self::ZoneReload => "zone-reload",
            Self::ZoneRefresh => "zone-refresh",
            Self::ZoneRetransfer => "zone-retransfer",
            Self::ZoneFlush => "zone-flush",
            Self::ZoneSign => "zone-sign",
            Self::ZoneRead => "zone-read",
            Self::ZoneBegin => "zone-begin",
            Self::ZoneCommit => "zone-commit",
            Self::ZoneAbort => "zone-abort",
            Self::ZoneDiff => "zone-diff",
            Self::ZoneGet => "zone-get",
            Self::ZoneSet => "zone-set",
            Self::ZoneUnset => "zone-unset",
            Self::ZonePurge => "zone-purge",
        }
    }
}

impl FromStr for Command {
    type Err = UnknownCommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.name() == text)
            .ok_or(UnknownCommandError)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error signaling that a command name is not recognized.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct UnknownCommandError;

impl fmt::Display for UnknownCommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("unknown command")
    }
}

impl std::error::Error for UnknownCommandError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
