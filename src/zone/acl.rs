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

//! Access-control lists for zone operations.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::name::Name;

/// A rule of an [`Acl`]: an address prefix, and optionally the name of
/// the TSIG key that requests must be signed with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AclRule {
    network: IpNet,
    key: Option<Name>,
}

impl AclRule {
    /// Returns whether a request from `addr`, signed with `key` (if at
    /// all), matches this rule.
    pub fn matches(&self, addr: IpAddr, key: Option<&Name>) -> bool {
        self.network.contains(&addr) && self.key.as_ref().map_or(true, |k| Some(k) == key)
    }
}

/// Parses a rule written as `ADDRESS[/PREFIX] [KEY]`.
impl FromStr for AclRule {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut fields = text.split_whitespace();
        let network = fields.next().ok_or("ACL rule is empty")?;
        let network = match network.parse::<IpNet>() {
            Ok(network) => network,
            Err(_) => network
                .parse::<IpAddr>()
                .map(IpNet::from)
                .or(Err("invalid address or prefix in ACL rule"))?,
        };
        let key = fields
            .next()
            .map(str::parse::<Name>)
            .transpose()
            .or(Err("invalid key name in ACL rule"))?;
        if fields.next().is_some() {
            return Err("trailing data in ACL rule");
        }
        Ok(Self { network, key })
    }
}

impl fmt::Display for AclRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.key {
            Some(ref key) => write!(f, "{} {}", self.network, key),
            None => write!(f, "{}", self.network),
        }
    }
}

/// An access-control list. A request is allowed if any rule matches;
/// an empty list allows nothing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Acl {
    rules: Vec<AclRule>,
}

impl Acl {
    /// Parses each of `rules` with [`AclRule::from_str`].
    pub fn parse<'a, I>(rules: I) -> Result<Self, &'static str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let rules = rules
            .into_iter()
            .map(str::parse)
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Returns whether a request from `addr`, signed with `key` (if at
    /// all), is allowed.
    pub fn allows(&self, addr: IpAddr, key: Option<&Name>) -> bool {
        self.rules.iter().any(|rule| rule.matches(addr, key))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<AclRule> for Acl {
    fn from_iter<I: IntoIterator<Item = AclRule>>(rules: I) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }
}

/// The access-control lists of a zone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ZoneAcls {
    /// Who may transfer the zone out (AXFR/IXFR).
    pub transfer_out: Acl,

    /// Who may send NOTIFY messages for the zone.
    pub notify_in: Acl,

    /// Who may send dynamic updates for the zone.
    pub update_in: Acl,
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_match_prefixes_and_keys() {
        let acl = Acl::parse(["192.0.2.0/24", "2001:db8::/32 key1.", "198.51.100.7"]).unwrap();
        let key1: Name = "key1.".parse().unwrap();
        let key2: Name = "key2.".parse().unwrap();

        assert!(acl.allows("192.0.2.99".parse().unwrap(), None));
        assert!(acl.allows("192.0.2.99".parse().unwrap(), Some(&key2)));
        assert!(!acl.allows("192.0.3.1".parse().unwrap(), None));
        assert!(acl.allows("198.51.100.7".parse().unwrap(), None));
        assert!(!acl.allows("198.51.100.8".parse().unwrap(), None));

        let v6 = "2001:db8::53".parse().unwrap();
        assert!(acl.allows(v6, Some(&key1)));
        assert!(!acl.allows(v6, Some(&key2)));
        assert!(!acl.allows(v6, None));
    }

    #[test]
    fn empty_acl_denies() {
        let acl = Acl::default();
        assert!(acl.is_empty());
        assert!(!acl.allows("127.0.0.1".parse().unwrap(), None));
    }

    #[test]
    fn bad_rules_are_rejected() {
        assert!("".parse::<AclRule>().is_err());
        assert!("192.0.2.0/33".parse::<AclRule>().is_err());
        assert!("192.0.2.1 nofqdn".parse::<AclRule>().is_err());
        assert!("192.0.2.1 k. extra".parse::<AclRule>().is_err());
    }
}
