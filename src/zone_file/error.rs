// Copyright 2021 Matthew Ingwersen.
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

//! Error types for zone file reading and writing.

use std::fmt;
use std::io;

use crate::name::{self, Name};
use crate::rr;

/// Represents errors that may occur while reading or writing a zone
/// file.
#[derive(Debug)]
pub enum Error {
    /// I/O errors encountered while reading or writing a zone file.
    Io(io::Error),

    /// Syntax errors, with the line on which they occurred.
    Syntax { line: usize, kind: ErrorKind },
}

impl Error {
    pub(super) fn syntax(line: usize, kind: ErrorKind) -> Self {
        Self::Syntax { line, kind }
    }
}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        Self::Io(io_error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(io_error) => write!(f, "I/O error: {}", io_error),
            Self::Syntax { line, kind } => write!(f, "{} at line {}", kind, line),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(io_error) => Some(io_error),
            Self::Syntax { .. } => None,
        }
    }
}

/// Kinds of zone file syntax errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    BadDirective(&'static str),
    EmptyOwnerWithNoPrevious,
    EofBeforeCloseParen,
    IncludeNotSupported,
    InvalidName(name::Error),
    InvalidRecord(rr::Error),
    NestedParens,
    OutOfZone(Name),
    UnknownDirective(String),
    UnmatchedCloseParen,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadDirective(msg) => f.write_str(msg),
            Self::EmptyOwnerWithNoPrevious => {
                f.write_str("the owner cannot be empty when no previous owner is available")
            }
            Self::EofBeforeCloseParen => {
                f.write_str("reached end of file before close parenthesis")
            }
            Self::IncludeNotSupported => f.write_str("$INCLUDE is not supported"),
            Self::InvalidName(name_err) => write!(f, "invalid name: {}", name_err),
            Self::InvalidRecord(rr_err) => write!(f, "invalid record: {}", rr_err),
            Self::NestedParens => f.write_str("nested parentheses"),
            Self::OutOfZone(owner) => write!(f, "{} is not within the zone", owner),
            Self::UnknownDirective(directive) => write!(f, "unknown directive {}", directive),
            Self::UnmatchedCloseParen => f.write_str("unmatched close parenthesis"),
        }
    }
}
