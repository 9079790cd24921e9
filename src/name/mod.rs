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

//! Implementation of data structures related to domain names.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

mod error;
mod label;
pub use error::Error;
pub use label::Label;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// An absolute domain name.
///
/// A `Name` stores its non-root [`Label`]s from left to right; the
/// terminating root label is implicit. Since labels are folded to
/// lowercase on construction, two `Name`s that differ only in case are
/// equal and hash identically, which is what the zone database wants
/// when it resolves owners given by operators.
///
/// `Name`s can be constructed
///
/// * through the [`FromStr`] implementation, which requires a fully
///   qualified name (with a trailing `.`);
/// * through [`Name::parse_relative`], which completes relative names
///   with an origin; and
/// * from a list of labels with [`Name::from_labels`].
///
/// The [`Ord`] implementation is DNSSEC's canonical ordering of names
/// ([RFC 4034 § 6.1]).
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Name {
    labels: Vec<Label>,
}

impl Name {
    /// Returns the root name `.`.
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Creates a `Name` from its non-root labels, given from left to
    /// right. This fails if the name would be too long on the wire.
    pub fn from_labels(labels: Vec<Label>) -> Result<Self, Error> {
        let wire_len = 1 + labels.iter().map(|l| l.len() + 1).sum::<usize>();
        if wire_len > MAX_WIRE_LEN {
            Err(Error::NameTooLong)
        } else {
            Ok(Self { labels })
        }
    }

    /// Parses a possibly relative name. `@` stands for `origin`; names
    /// without a trailing `.` are completed by appending `origin`.
    pub fn parse_relative(text: &str, origin: &Name) -> Result<Self, Error> {
        if text == "@" {
            return Ok(origin.clone());
        }
        let (mut labels, fully_qualified) = parse_labels(text)?;
        if !fully_qualified {
            labels.extend(origin.labels.iter().cloned());
        }
        Self::from_labels(labels)
    }

    /// Returns whether `self` is equal to or a subdomain of `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.labels.len() >= other.labels.len()
            && self.labels[self.labels.len() - other.labels.len()..] == other.labels[..]
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns whether this is a wildcard name, i.e., whether its
    /// leftmost label is `*`.
    pub fn is_wildcard(&self) -> bool {
        self.labels.first().map_or(false, Label::is_asterisk)
    }

    /// Returns an iterator over the non-root labels of the name, from
    /// left to right.
    pub fn labels(&self) -> std::slice::Iter<Label> {
        self.labels.iter()
    }

    /// Returns the number of non-root labels in the name. The root
    /// name has length zero.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns the length of the uncompressed wire representation.
    pub fn wire_len(&self) -> usize {
        1 + self.labels.iter().map(|l| l.len() + 1).sum::<usize>()
    }

    /// Returns the name formed by removing the leftmost `skip` labels,
    /// or `None` if the name does not have that many labels.
    pub fn superdomain(&self, skip: usize) -> Option<Self> {
        self.labels.get(skip..).map(|rest| Self {
            labels: rest.to_vec(),
        })
    }

    /// Returns the label at depth `depth` below the root: depth 1 is
    /// the rightmost non-root label. Returns `None` for depth 0 or for
    /// depths beyond the leftmost label.
    pub fn label_at_depth(&self, depth: usize) -> Option<&Label> {
        if depth == 0 || depth > self.labels.len() {
            None
        } else {
            Some(&self.labels[self.labels.len() - depth])
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str(".");
        }
        for label in &self.labels {
            write!(f, "{}.", label)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The [`Ord`] implementation for `Name` employs DNSSEC's canonical
/// ordering of domain names. Per [RFC 4034 § 6.1], `Name`s are ordered
/// as strings of labels read from right to left.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels
            .iter()
            .rev()
            .zip(other.labels.iter().rev())
            .find_map(|(a, b)| Some(a.cmp(b)).filter(|ordering| ordering.is_ne()))
            .unwrap_or_else(|| self.labels.len().cmp(&other.labels.len()))
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The passed
/// string must be strictly ASCII and fully qualified. Escape sequences
/// as defined by [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_labels(s)? {
            (labels, true) => Self::from_labels(labels),
            (_, false) => Err(Error::NotFullyQualified),
        }
    }
}

/// Splits `text` into labels, processing escapes. Also returns whether
/// the text ended with the (unescaped) root label.
fn parse_labels(text: &str) -> Result<(Vec<Label>, bool), Error> {
    if text.is_empty() {
        return Err(Error::StrEmpty);
    } else if text == "." {
        return Ok((Vec::new(), true));
    }

    let mut labels = Vec::new();
    let mut current = Vec::new();
    let mut remaining_octets = text.as_bytes();

    // NOTE: to check that the string is ASCII, it suffices to check
    // that each octet is ASCII as we go. This is because all
    // multi-byte characters start with an octet that is not ASCII.
    while let Some(&octet) = remaining_octets.first() {
        if octet == b'\\' {
            let (value, consumed) = parse_escape(&remaining_octets[1..])?;
            current.push(value);
            remaining_octets = &remaining_octets[consumed + 1..];
        } else if octet == b'.' {
            if current.is_empty() {
                return Err(Error::NullNonTerminal);
            }
            labels.push(Label::try_from(current.as_slice())?);
            current.clear();
            remaining_octets = &remaining_octets[1..];
        } else if !octet.is_ascii() {
            return Err(Error::StrNotAscii);
        } else {
            current.push(octet);
            remaining_octets = &remaining_octets[1..];
        }
    }

    if current.is_empty() {
        Ok((labels, true))
    } else {
        labels.push(Label::try_from(current.as_slice())?);
        Ok((labels, false))
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    if remaining_octets.is_empty() {
        Err(Error::InvalidEscape)
    } else if remaining_octets[0].is_ascii_digit() {
        if remaining_octets.len() < 3
            || !remaining_octets[1].is_ascii_digit()
            || !remaining_octets[2].is_ascii_digit()
        {
            Err(Error::InvalidEscape)
        } else {
            let hundreds = (remaining_octets[0] - b'0') as usize;
            let tens = (remaining_octets[1] - b'0') as usize;
            let ones = (remaining_octets[2] - b'0') as usize;
            let value = 100 * hundreds + 10 * tens + ones;
            if value > 255 {
                Err(Error::InvalidEscape)
            } else {
                Ok((value as u8, 3))
            }
        }
    } else {
        Ok((remaining_octets[0], 1))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
