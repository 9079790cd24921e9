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

//! Provides the [`Rdata`] type.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::{Error, Serial, Ttl, Type};
use crate::name::Name;
use crate::util::split_fields;

/// The RDATA of a resource record, held in normalized presentation
/// form.
///
/// Almanac does not encode RDATA to the wire itself; that is the job
/// of whoever serves the zone. It does, however, need RDATA to compare
/// reliably: two records are the same record exactly when their owner,
/// type, and `Rdata` are equal. So the text is normalized when it is
/// parsed:
///
/// * fields are separated by single spaces;
/// * domain names in the RDATA of well-known types are made absolute
///   and folded to lowercase;
/// * addresses and integers are rewritten in their canonical forms; and
/// * the generic encoding of [RFC 3597 § 5] is checked and its hex is
///   lowercased.
///
/// RDATA of other types is checked only for being non-empty.
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rdata(Box<str>);

impl Rdata {
    /// Parses and normalizes `text` as RDATA of type `rr_type`.
    /// Relative domain names are completed with `origin`.
    pub fn parse(rr_type: Type, text: &str, origin: &Name) -> Result<Self, Error> {
        let fields = split_fields(text).ok_or(Error::Rdata(rr_type, "unterminated quote"))?;
        if fields.is_empty() {
            return Err(Error::MissingField("RDATA"));
        } else if fields[0] == "\\#" {
            return parse_generic(rr_type, &fields[1..]).map(Self::from);
        }

        let normalized = match rr_type {
            Type::A => {
                let [addr] = exact::<1>(rr_type, &fields)?;
                addr.parse::<Ipv4Addr>()
                    .or(Err(Error::Rdata(rr_type, "invalid IPv4 address")))?
                    .to_string()
            }
            Type::AAAA => {
                let [addr] = exact::<1>(rr_type, &fields)?;
                addr.parse::<Ipv6Addr>()
                    .or(Err(Error::Rdata(rr_type, "invalid IPv6 address")))?
                    .to_string()
            }
            Type::NS | Type::CNAME | Type::PTR | Type::DNAME => {
                let [target] = exact::<1>(rr_type, &fields)?;
                Name::parse_relative(target, origin)?.to_string()
            }
            Type::MX => {
                let [preference, exchange] = exact::<2>(rr_type, &fields)?;
                format!(
                    "{} {}",
                    parse_u16(rr_type, preference)?,
                    Name::parse_relative(exchange, origin)?
                )
            }
            Type::SRV => {
                let [priority, weight, port, target] = exact::<4>(rr_type, &fields)?;
                format!(
                    "{} {} {} {}",
                    parse_u16(rr_type, priority)?,
                    parse_u16(rr_type, weight)?,
                    parse_u16(rr_type, port)?,
                    Name::parse_relative(target, origin)?
                )
            }
            Type::SOA => {
                let [mname, rname, serial, refresh, retry, expire, minimum] =
                    exact::<7>(rr_type, &fields)?;
                let serial: Serial = serial.parse().map_err(|msg| Error::Rdata(rr_type, msg))?;
                let mut text = format!(
                    "{} {} {}",
                    Name::parse_relative(mname, origin)?,
                    Name::parse_relative(rname, origin)?,
                    serial
                );
                for timer in [refresh, retry, expire, minimum] {
                    let value: Ttl = timer.parse().map_err(|msg| Error::Rdata(rr_type, msg))?;
                    text.push(' ');
                    text.push_str(&value.to_string());
                }
                text
            }
            _ => fields.join(" "),
        };
        Ok(Self::from(normalized))
    }

    /// Returns the normalized presentation text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the serial field, if this is (normalized) SOA RDATA.
    pub fn soa_serial(&self) -> Option<Serial> {
        self.0.split(' ').nth(2).and_then(|f| f.parse().ok())
    }

    /// Returns a copy of this SOA RDATA with the serial field replaced.
    /// Returns `None` if this is not SOA RDATA.
    pub fn with_soa_serial(&self, serial: Serial) -> Option<Self> {
        let fields: Vec<&str> = self.0.split(' ').collect();
        if fields.len() != 7 {
            return None;
        }
        let serial = serial.to_string();
        let mut replaced = fields;
        replaced[2] = &serial;
        Some(Self::from(replaced.join(" ")))
    }

    /// Returns the domain name that RDATA of type `rr_type` points to,
    /// for types whose RDATA contains exactly one such target (NS,
    /// CNAME, PTR, DNAME, MX, and SRV).
    pub fn target(&self, rr_type: Type) -> Option<Name> {
        let field = match rr_type {
            Type::NS | Type::CNAME | Type::PTR | Type::DNAME => self.0.split(' ').next(),
            Type::MX => self.0.split(' ').nth(1),
            Type::SRV => self.0.split(' ').nth(3),
            _ => None,
        };
        field.and_then(|text| text.parse().ok())
    }
}

impl From<String> for Rdata {
    fn from(text: String) -> Self {
        Self(text.into_boxed_str())
    }
}

impl fmt::Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

/// Destructures `fields` into exactly `N` fields.
fn exact<'a, const N: usize>(rr_type: Type, fields: &[&'a str]) -> Result<[&'a str; N], Error> {
    <[&str; N]>::try_from(fields).or(Err(Error::Rdata(rr_type, "wrong number of fields")))
}

fn parse_u16(rr_type: Type, text: &str) -> Result<u16, Error> {
    text.parse()
        .or(Err(Error::Rdata(rr_type, "invalid 16-bit integer")))
}

/// Checks the generic RDATA encoding `\# LENGTH HEX...` and returns its
/// normalized form.
fn parse_generic(rr_type: Type, fields: &[&str]) -> Result<String, Error> {
    let (length, hex) = fields
        .split_first()
        .ok_or(Error::Rdata(rr_type, "missing generic RDATA length"))?;
    let length: u16 = length
        .parse()
        .or(Err(Error::Rdata(rr_type, "invalid generic RDATA length")))?;
    let hex = hex.concat().to_ascii_lowercase();
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        Err(Error::Rdata(rr_type, "invalid hexadecimal"))
    } else if hex.len() != 2 * length as usize {
        Err(Error::Rdata(rr_type, "generic RDATA length mismatch"))
    } else if hex.is_empty() {
        Ok("\\# 0".to_owned())
    } else {
        Ok(format!("\\# {} {}", length, hex))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
