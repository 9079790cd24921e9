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

//! Provides the [`Serial`] structure for zone serial numbers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The serial number of a zone, as found in its SOA record.
///
/// Serial numbers are 32 bits wide and wrap around, so they use the
/// sequence space arithmetic of [RFC 1982]. Only addition of values up
/// to 2³¹ - 1 is defined, and only a partial order exists: two serials
/// exactly 2³¹ apart are neither less than nor greater than each other.
/// For this reason, `Serial` implements [`PartialOrd`] but not [`Ord`].
///
/// [RFC 1982]: https://datatracker.ietf.org/doc/html/rfc1982
#[derive(Clone, Copy, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Serial(u32);

impl Serial {
    /// The largest value that may be added to a serial number.
    pub const MAX_INCREMENT: u32 = (1 << 31) - 1;

    /// Returns a serial number for the current Unix time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self(secs as u32)
    }

    /// Adds `n` to the serial number, wrapping around as described in
    /// RFC 1982 § 3.1. Values of `n` above [`Serial::MAX_INCREMENT`]
    /// are undefined by the RFC and are clamped.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, n: u32) -> Self {
        Self(self.0.wrapping_add(n.min(Self::MAX_INCREMENT)))
    }

    /// Returns whether `self` is strictly newer than `other`.
    pub fn is_newer_than(self, other: Serial) -> bool {
        self.partial_cmp(&other) == Some(Ordering::Greater)
    }
}

impl From<u32> for Serial {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> Self {
        serial.0
    }
}

/// Comparison as described in RFC 1982 § 3.2.
impl PartialOrd for Serial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        const HALF: u32 = 1 << 31;
        let (i1, i2) = (self.0, other.0);
        if i1 == i2 {
            Some(Ordering::Equal)
        } else if (i1 < i2 && i2 - i1 < HALF) || (i1 > i2 && i1 - i2 > HALF) {
            Some(Ordering::Less)
        } else if (i1 < i2 && i2 - i1 > HALF) || (i1 > i2 && i1 - i2 < HALF) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl FromStr for Serial {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.parse::<u32>()
            .map(Self)
            .or(Err("serial is not a valid unsigned 32-bit integer"))
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
