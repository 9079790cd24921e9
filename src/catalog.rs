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

//! Implementation of the [`Catalog`] structure.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use log::error;

use crate::name::Name;
use crate::zone::{EventType, Zone};

/// The collection of all zones served by a server.
///
/// A [catalog][RFC 1035 § 6.1.2] hands out zones as `Arc<Zone>`, so a
/// zone removed from the catalog lives on until its last user is done
/// with it.
///
/// [RFC 1035 § 6.1.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-6.1.2
#[derive(Debug, Default)]
pub struct Catalog {
    zones: RwLock<BTreeMap<Name, Arc<Zone>>>,
}

impl Catalog {
    /// Creates a new, initially empty `Catalog`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `zone` to the catalog, replacing and returning the
    /// preexisting [`Zone`] of that name (if any).
    pub fn insert(&self, zone: Zone) -> Option<Arc<Zone>> {
        self.write().insert(zone.name().clone(), Arc::new(zone))
    }

    pub fn remove(&self, name: &Name) -> Option<Arc<Zone>> {
        self.write().remove(name)
    }

    /// Returns the zone named `name`.
    pub fn get(&self, name: &Name) -> Option<Arc<Zone>> {
        self.read().get(name).cloned()
    }

    /// Returns the zone named by `text`. The name is matched without
    /// regard to case, and the trailing `.` may be left out.
    pub fn find(&self, text: &str) -> Option<Arc<Zone>> {
        Name::parse_relative(text, &Name::root())
            .ok()
            .and_then(|name| self.get(&name))
    }

    /// Looks up the zone that is the nearest ancestor to `name` (i.e.,
    /// the zone whose name matches the most consecutive labels in
    /// `name`, starting from the right). This is step 2 of the lookup
    /// algorithm given in [RFC 1034 § 4.3.2].
    ///
    /// [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
    pub fn lookup(&self, name: &Name) -> Option<Arc<Zone>> {
        let zones = self.read();
        (0..=name.len())
            .filter_map(|skip| name.superdomain(skip))
            .find_map(|candidate| zones.get(&candidate).cloned())
    }

    /// Returns all zones, in canonical order of their names.
    pub fn zones(&self) -> Vec<Arc<Zone>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns when the next event of any zone falls due.
    pub fn next_event(&self) -> Option<Instant> {
        self.read()
            .values()
            .filter_map(|zone| zone.events().next())
            .map(|(_, at)| at)
            .min()
    }

    /// Runs the events of all zones that are due at `now`. Failures are
    /// logged. Returns the events that the zones do not carry out
    /// themselves, for the caller to pass on.
    pub fn run_due_events(&self, now: Instant) -> Vec<(Arc<Zone>, EventType)> {
        let mut unhandled = Vec::new();
        for zone in self.zones() {
            for event in zone.events().take_due(now) {
                match zone.run_event(event) {
                    Ok(true) => (),
                    Ok(false) => unhandled.push((zone.clone(), event)),
                    Err(err) => error!("Zone {}: {} failed: {}", zone.name(), event, err),
                }
            }
        }
        unhandled
    }

    fn read(&self) -> RwLockReadGuard<BTreeMap<Name, Arc<Zone>>> {
        self.zones.read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<BTreeMap<Name, Arc<Zone>>> {
        self.zones.write().unwrap()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneConfig;

    fn catalog(names: &[&str]) -> Catalog {
        let catalog = Catalog::new();
        for name in names {
            let zone = Zone::new(name.parse().unwrap(), ZoneConfig::default()).unwrap();
            catalog.insert(zone);
        }
        catalog
    }

    #[test]
    fn find_ignores_case_and_trailing_dot() {
        let catalog = catalog(&["almanac.test.", "other.test."]);
        let zone = catalog.find("ALMANAC.Test").unwrap();
        assert_eq!(zone.name(), &"almanac.test.".parse::<Name>().unwrap());
        assert!(catalog.find("almanac.test.").is_some());
        assert!(catalog.find("missing.test").is_none());
        assert!(catalog.find("bad..name").is_none());
    }

    #[test]
    fn lookup_finds_nearest_ancestor() {
        let catalog = catalog(&["test.", "almanac.test.", "sub.almanac.test."]);
        let lookup = |name: &str| {
            catalog
                .lookup(&name.parse().unwrap())
                .map(|zone| zone.name().to_string())
        };
        assert_eq!(lookup("www.sub.almanac.test.").as_deref(), Some("sub.almanac.test."));
        assert_eq!(lookup("www.almanac.test.").as_deref(), Some("almanac.test."));
        assert_eq!(lookup("almanac.test.").as_deref(), Some("almanac.test."));
        assert_eq!(lookup("other.test.").as_deref(), Some("test."));
        assert_eq!(lookup("example."), None);
    }

    #[test]
    fn zones_are_in_canonical_order() {
        let catalog = catalog(&["b.test.", "a.test.", "test."]);
        let names: Vec<String> = catalog
            .zones()
            .iter()
            .map(|zone| zone.name().to_string())
            .collect();
        assert_eq!(names, ["test.", "a.test.", "b.test."]);
        assert_eq!(catalog.remove(&"a.test.".parse().unwrap()).is_some(), true);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn run_due_events_reports_unhandled_events() {
        let catalog = catalog(&["almanac.test."]);
        let zone = catalog.find("almanac.test.").unwrap();
        zone.events().schedule_now(EventType::Notify);
        zone.events().schedule_now(EventType::Load);
        assert!(catalog.next_event().is_some());

        // The load fails (there is no zone file) and is only logged.
        let unhandled = catalog.run_due_events(Instant::now());
        assert_eq!(unhandled.len(), 1);
        assert_eq!(unhandled[0].1, EventType::Notify);
        assert!(catalog.next_event().is_none());
    }
}
