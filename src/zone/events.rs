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

//! The per-zone event schedule.
//!
//! Zone operations often leave work to be done later: a commit needs
//! the zone file flushed and secondaries notified, a control command
//! asks for a reload, a dynamic update waits in the queue. Such work is
//! recorded here as a one-shot event with a due time. Running the
//! events when they fall due is left to whoever drives the zones (see
//! [`ZoneEvents::take_due`]).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The types of events that can be scheduled for a zone.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum EventType {
    Load,
    Refresh,
    Transfer,
    Update,
    Expire,
    Flush,
    Notify,
    Dnssec,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        Self::Load,
        Self::Refresh,
        Self::Transfer,
        Self::Update,
        Self::Expire,
        Self::Flush,
        Self::Notify,
        Self::Dnssec,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Refresh => "refresh",
            Self::Transfer => "transfer",
            Self::Update => "update",
            Self::Expire => "expiration",
            Self::Flush => "journal flush",
            Self::Notify => "notify",
            Self::Dnssec => "DNSSEC resign",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A zone's table of scheduled events. Each event type is scheduled at
/// most once.
#[derive(Debug, Default)]
pub struct ZoneEvents {
    due: Mutex<BTreeMap<EventType, Instant>>,
}

impl ZoneEvents {
    /// Schedules `event` at `at`. If the event is already scheduled,
    /// the earlier of the two times is kept.
    pub fn schedule(&self, event: EventType, at: Instant) {
        let mut due = self.lock();
        let entry = due.entry(event).or_insert(at);
        if at < *entry {
            *entry = at;
        }
    }

    /// Schedules `event` to run as soon as possible.
    pub fn schedule_now(&self, event: EventType) {
        self.schedule(event, Instant::now());
    }

    /// Removes `event` from the schedule.
    pub fn cancel(&self, event: EventType) {
        self.lock().remove(&event);
    }

    /// Removes every event from the schedule.
    pub fn cancel_all(&self) {
        self.lock().clear();
    }

    /// Returns when `event` is due, if it is scheduled.
    pub fn when(&self, event: EventType) -> Option<Instant> {
        self.lock().get(&event).copied()
    }

    /// Returns the event that falls due first.
    pub fn next(&self) -> Option<(EventType, Instant)> {
        self.lock()
            .iter()
            .min_by_key(|(event, at)| (**at, **event))
            .map(|(event, at)| (*event, *at))
    }

    /// Removes and returns all events due at or before `now`, earliest
    /// first.
    pub fn take_due(&self, now: Instant) -> Vec<EventType> {
        let mut due = self.lock();
        let mut ready: Vec<(Instant, EventType)> = due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(event, at)| (*at, *event))
            .collect();
        ready.sort();
        for (_, event) in ready.iter() {
            due.remove(event);
        }
        ready.into_iter().map(|(_, event)| event).collect()
    }

    /// Describes the next event for status output: `"<event> pending"`
    /// if it is already due, `"<event> in 1h2m3s"` if not, or `"idle"`.
    pub fn describe_next(&self, now: Instant) -> String {
        match self.next() {
            None => "idle".to_owned(),
            Some((event, at)) if at <= now => format!("{} pending", event),
            Some((event, at)) => format!("{} in {}", event, format_duration(at - now)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<BTreeMap<EventType, Instant>> {
        self.due.lock().unwrap()
    }
}

/// Formats a duration as `XhYmZs`, leaving out leading zero units.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_keeps_earlier_time() {
        let events = ZoneEvents::default();
        let now = Instant::now();
        events.schedule(EventType::Flush, now + Duration::from_secs(10));
        events.schedule(EventType::Flush, now + Duration::from_secs(20));
        assert_eq!(events.when(EventType::Flush), Some(now + Duration::from_secs(10)));
        events.schedule(EventType::Flush, now);
        assert_eq!(events.when(EventType::Flush), Some(now));
    }

    #[test]
    fn take_due_returns_earliest_first() {
        let events = ZoneEvents::default();
        let now = Instant::now();
        events.schedule(EventType::Notify, now);
        events.schedule(EventType::Flush, now - Duration::from_secs(1));
        events.schedule(EventType::Refresh, now + Duration::from_secs(60));
        assert_eq!(events.next().map(|(e, _)| e), Some(EventType::Flush));
        assert_eq!(
            events.take_due(now),
            [EventType::Flush, EventType::Notify],
        );
        assert_eq!(events.take_due(now), []);
        assert_eq!(events.next().map(|(e, _)| e), Some(EventType::Refresh));
    }

    #[test]
    fn describe_next_works() {
        let events = ZoneEvents::default();
        let now = Instant::now();
        assert_eq!(events.describe_next(now), "idle");
        events.schedule(EventType::Refresh, now + Duration::from_secs(3725));
        assert_eq!(events.describe_next(now), "refresh in 1h2m5s");
        events.schedule(EventType::Load, now);
        assert_eq!(events.describe_next(now), "load pending");
    }

    #[test]
    fn format_duration_omits_leading_zero_units() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m5s");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h0m0s");
    }
}
