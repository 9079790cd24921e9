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

//! Provides the [`Record`] type and single-line record parsing.

use std::fmt;

use super::{Class, Error, Rdata, Ttl, Type};
use crate::name::Name;
use crate::util::split_fields;

/// A single resource record. The class is always IN.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub owner: Name,
    pub ttl: Ttl,
    pub rr_type: Type,
    pub rdata: Rdata,
}

impl Record {
    /// Builds a record from separately-given textual fields.
    ///
    /// The owner is completed with `origin` when it is relative. When
    /// `ttl` is `None`, `resolve_ttl` is asked for a TTL given the
    /// parsed owner and type; if it has none, [`Error::MissingTtl`] is
    /// returned.
    pub fn from_fields<F>(
        owner: &str,
        ttl: Option<&str>,
        rr_type: &str,
        data: &str,
        origin: &Name,
        resolve_ttl: F,
    ) -> Result<Self, Error>
    where
        F: FnOnce(&Name, Type) -> Option<Ttl>,
    {
        let owner = Name::parse_relative(owner, origin)?;
        let rr_type: Type = rr_type.parse().map_err(Error::Type)?;
        let ttl = match ttl {
            Some(text) => text.parse().map_err(Error::Ttl)?,
            None => resolve_ttl(&owner, rr_type).ok_or(Error::MissingTtl)?,
        };
        let rdata = Rdata::parse(rr_type, data, origin)?;
        Ok(Self {
            owner,
            ttl,
            rr_type,
            rdata,
        })
    }

    /// Parses a record given on a single line as
    /// `OWNER [TTL] [CLASS] TYPE RDATA`, where the TTL and class may
    /// appear in either order. A field beginning with a digit is taken
    /// to be the TTL.
    pub fn parse(line: &str, origin: &Name, default_ttl: Option<Ttl>) -> Result<Self, Error> {
        let fields = split_fields(line).ok_or(Error::MissingField("closing quote"))?;
        let mut fields = fields.into_iter();
        let owner = fields.next().ok_or(Error::MissingField("owner"))?;

        let mut ttl = None;
        let mut rr_type = None;
        for field in fields.by_ref() {
            if field.starts_with(|c: char| c.is_ascii_digit()) && ttl.is_none() {
                ttl = Some(field);
            } else if let Ok(class) = field.parse::<Class>() {
                if class != Class::IN {
                    return Err(Error::Class("only class IN is supported"));
                }
            } else {
                rr_type = Some(field);
                break;
            }
        }
        let rr_type = rr_type.ok_or(Error::MissingField("type"))?;
        let data = fields.collect::<Vec<_>>().join(" ");
        Self::from_fields(owner, ttl, rr_type, &data, origin, |_, _| default_ttl)
    }
}

/// Records are displayed on one line, in the form that
/// [`Record::parse`] reads.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.owner, self.ttl, self.rr_type, self.rdata
        )
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
