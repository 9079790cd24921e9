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

//! Implementation of the [`Label`] type.

use std::fmt;

use super::{Error, MAX_LABEL_LEN};

/// The label given to a node in the Domain Name System's tree
/// structure.
///
/// A `Label` owns at most 63 octets. Unlike on the wire, where case is
/// preserved, the octets are folded to ASCII lowercase when the label
/// is constructed: a zone database compares names case-insensitively
/// ([RFC 4343]) and has no use for the original case. Because of this,
/// the derived [`Ord`] implementation is exactly DNSSEC's canonical
/// ordering of labels ([RFC 4034 § 6.1]): labels are compared as
/// unsigned left-justified octet strings, and a shorter label sorts
/// before a longer one that it prefixes.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
/// [RFC 4343]: https://datatracker.ietf.org/doc/html/rfc4343
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Label {
    octets: Box<[u8]>,
}

impl Label {
    /// Returns the asterisk label `*`, used in wildcard names.
    pub fn asterisk() -> Self {
        Self {
            octets: Box::new([b'*']),
        }
    }

    /// Returns whether this is the asterisk label.
    pub fn is_asterisk(&self) -> bool {
        &*self.octets == b"*"
    }

    /// Returns the length of the label in octets.
    #[allow(clippy::len_without_is_empty)] // Labels inside a name are never empty.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns the (lowercase) octets of the label.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = Error;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else {
            Ok(Self {
                octets: octets.to_ascii_lowercase().into_boxed_slice(),
            })
        }
    }
}

/// Labels are displayed in the zone file format:
///
/// * `.` and `\` are escaped as `\.` and `\\`;
/// * other printable ASCII characters are output verbatim; and
/// * all other octets are escaped `\xyz`, where `xyz` is the
///   three-digit zero-padded decimal representation of the octet.
impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for octet in self.octets.iter() {
            if *octet == b'.' {
                f.write_str("\\.")?;
            } else if *octet == b'\\' {
                f.write_str("\\\\")?;
            } else if octet.is_ascii_graphic() {
                write!(f, "{}", *octet as char)?;
            } else {
                write!(f, "\\{:03}", *octet)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_folds_case() {
        let label = Label::try_from(&b"ExAmPlE"[..]).unwrap();
        assert_eq!(label.octets(), b"example");
    }

    #[test]
    fn construction_rejects_long_labels() {
        assert_eq!(Label::try_from(&[b'x'; 64][..]), Err(Error::LabelTooLong));
        assert!(Label::try_from(&[b'x'; 63][..]).is_ok());
    }

    #[test]
    fn display_escapes() {
        let label = Label::try_from(&b"a.b\\c\x07"[..]).unwrap();
        assert_eq!(label.to_string(), "a\\.b\\\\c\\007");
    }

    #[test]
    fn ordering_is_canonical() {
        let short = Label::try_from(&b"z"[..]).unwrap();
        let long = Label::try_from(&b"zabc"[..]).unwrap();
        let escaped = Label::try_from(&b"\x01"[..]).unwrap();
        assert!(short < long);
        assert!(escaped < short);
        assert!(Label::asterisk() < short);
    }
}
