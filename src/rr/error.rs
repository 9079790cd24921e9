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

//! Implementation of the [`Error`] type for record-related errors.

use std::fmt;

use super::Type;
use crate::name;

/// An error signaling that record text could not be understood.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// An owner name (or a name inside RDATA) was invalid.
    Name(name::Error),

    /// The RR type was not recognized.
    Type(&'static str),

    /// The class was not recognized or is not IN.
    Class(&'static str),

    /// The TTL was invalid.
    Ttl(&'static str),

    /// The RDATA was not valid for its type.
    Rdata(Type, &'static str),

    /// A required field was missing.
    MissingField(&'static str),

    /// No TTL was given and none could be inferred.
    MissingTtl,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Name(err) => write!(f, "invalid name: {}", err),
            Self::Type(msg) => write!(f, "invalid type: {}", msg),
            Self::Class(msg) => write!(f, "invalid class: {}", msg),
            Self::Ttl(msg) => write!(f, "invalid TTL: {}", msg),
            Self::Rdata(rr_type, msg) => write!(f, "invalid {} RDATA: {}", rr_type, msg),
            Self::MissingField(field) => write!(f, "missing {}", field),
            Self::MissingTtl => f.write_str("no TTL was given and none could be inferred"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Name(err) => Some(err),
            _ => None,
        }
    }
}

impl From<name::Error> for Error {
    fn from(err: name::Error) -> Self {
        Self::Name(err)
    }
}
