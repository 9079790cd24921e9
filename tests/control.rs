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

//! Drives the control surface end to end through an in-memory channel.

use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::sync::Arc;

use lazy_static::lazy_static;
use tempfile::TempDir;

use almanac::catalog::Catalog;
use almanac::ctl::{self, Channel, ChannelError, Command, Data, Outcome, UnitType};
use almanac::name::Name;
use almanac::rr::{Serial, Type};
use almanac::zone::{EventType, Zone, ZoneConfig};

lazy_static! {
    static ref APEX: Name = "almanac.test.".parse().unwrap();
    static ref WWW: Name = "www.almanac.test.".parse().unwrap();
    static ref OLD: Name = "old.almanac.test.".parse().unwrap();
}

const ZONE_FILE: &str = "\
$ORIGIN almanac.test.
$TTL 3600
@ SOA ns hostmaster 10 3600 900 604800 300
@ NS ns
ns A 192.0.2.53
www A 1.2.3.4
old TXT \"old data\"
";

////////////////////////////////////////////////////////////////////////
// FIXTURES                                                           //
////////////////////////////////////////////////////////////////////////

/// A channel that hands out queued units and records the units sent.
/// Once the queue is empty, it receives end units.
#[derive(Default)]
struct MemoryChannel {
    incoming: VecDeque<Result<(UnitType, Data), ChannelError>>,
    sent: Vec<(UnitType, Data)>,
}

impl MemoryChannel {
    /// Queues each of `requests` as a data unit followed by a block
    /// unit, then an end unit.
    fn with_requests(requests: impl IntoIterator<Item = Data>) -> Self {
        let mut channel = Self::default();
        for request in requests {
            channel.push(request);
        }
        channel.incoming.push_back(Ok((UnitType::End, Data::default())));
        channel
    }

    fn push(&mut self, request: Data) {
        self.incoming.push_back(Ok((UnitType::Data, request)));
        self.incoming.push_back(Ok((UnitType::Block, Data::default())));
    }

    /// Splits the sent units into the responses to each request.
    fn responses(&self) -> Vec<Vec<(UnitType, Data)>> {
        let mut responses = vec![Vec::new()];
        for (unit_type, data) in &self.sent {
            match unit_type {
                UnitType::Block => responses.push(Vec::new()),
                _ => responses.last_mut().unwrap().push((*unit_type, data.clone())),
            }
        }
        responses.pop();
        responses
    }
}

impl Channel for MemoryChannel {
    fn receive(&mut self) -> Result<(UnitType, Data), ChannelError> {
        self.incoming
            .pop_front()
            .unwrap_or_else(|| Ok((UnitType::End, Data::default())))
    }

    fn send(&mut self, unit_type: UnitType, data: &Data) -> Result<(), ChannelError> {
        self.sent.push((unit_type, data.clone()));
        Ok(())
    }
}

/// Builds a request for `command` on the zone `zone`, with the fields
/// `(owner, type, ttl, data)` set where given.
fn request(
    command: Command,
    zone: &str,
    owner: Option<&str>,
    rr_type: Option<&str>,
    ttl: Option<&str>,
    data: Option<&str>,
) -> Data {
    Data {
        zone: Some(zone.to_owned()),
        owner: owner.map(str::to_owned),
        rr_type: rr_type.map(str::to_owned),
        ttl: ttl.map(str::to_owned),
        data: data.map(str::to_owned),
        ..Data::request(command)
    }
}

fn zone_request(command: Command) -> Data {
    request(command, "almanac.test.", None, None, None, None)
}

/// Creates a catalog holding almanac.test., loaded from a zone file in
/// `dir` and journaled there.
fn catalog(dir: &TempDir) -> (Catalog, Arc<Zone>) {
    let zone_file = dir.path().join("almanac.test.zone");
    fs::write(&zone_file, ZONE_FILE).unwrap();
    let config = ZoneConfig {
        zone_file: Some(zone_file),
        journal: Some(dir.path().join("almanac.test.journal")),
        zonefile_sync: -1,
        ..ZoneConfig::default()
    };
    let zone = Zone::new(APEX.clone(), config).unwrap();
    zone.load().unwrap();
    let catalog = Catalog::new();
    catalog.insert(zone);
    let zone = catalog.get(&APEX).unwrap();
    (catalog, zone)
}

fn run(catalog: &Catalog, requests: impl IntoIterator<Item = Data>) -> MemoryChannel {
    let mut channel = MemoryChannel::with_requests(requests);
    assert_eq!(
        ctl::process(catalog, &mut channel).unwrap(),
        Outcome::Continue
    );
    channel
}

fn errors(channel: &MemoryChannel) -> Vec<Option<String>> {
    channel
        .responses()
        .into_iter()
        .map(|units| units.into_iter().find_map(|(_, data)| data.error))
        .collect()
}

fn a_records(zone: &Zone, owner: &Name) -> BTreeSet<String> {
    zone.contents()
        .and_then(|contents| {
            contents.find_node(owner).and_then(|node| {
                node.rrset(Type::A)
                    .map(|rrset| rrset.rdatas.iter().map(|rdata| rdata.to_string()).collect())
            })
        })
        .unwrap_or_default()
}

////////////////////////////////////////////////////////////////////////
// TRANSACTIONS                                                       //
////////////////////////////////////////////////////////////////////////

#[test]
fn replacing_a_record_commits_and_journals() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            request(
                Command::ZoneUnset,
                "almanac.test",
                Some("www"),
                Some("A"),
                None,
                Some("1.2.3.4"),
            ),
            request(
                Command::ZoneSet,
                "almanac.test",
                Some("www.almanac.test."),
                Some("A"),
                Some("3600"),
                Some("5.6.7.8"),
            ),
            zone_request(Command::ZoneCommit),
        ],
    );
    assert_eq!(errors(&channel), [None, None, None, None]);

    assert_eq!(zone.serial(), Some(Serial::from(11)));
    assert_eq!(a_records(&zone, &WWW), BTreeSet::from(["5.6.7.8".to_owned()]));
    assert!(!zone.has_open_update());

    let journal = zone.journal().unwrap();
    assert_eq!(journal.len(), 1);
    let changesets = journal.replay_from(Serial::from(10)).unwrap();
    let removed: Vec<_> = changesets[0].iter_removals().collect();
    let added: Vec<_> = changesets[0].iter_additions().collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].0, &*WWW);
    assert_eq!(removed[0].1.rdatas.iter().next().unwrap().as_str(), "1.2.3.4");
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].1.rdatas.iter().next().unwrap().as_str(), "5.6.7.8");
}

#[test]
fn unset_without_type_removes_the_node() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);
    assert!(zone.contents().unwrap().find_node(&OLD).is_some());

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            request(
                Command::ZoneUnset,
                "almanac.test.",
                Some("old"),
                None,
                None,
                None,
            ),
            zone_request(Command::ZoneCommit),
        ],
    );
    assert_eq!(errors(&channel), [None, None, None]);
    let contents = zone.contents().unwrap();
    assert!(contents
        .find_node(&OLD)
        .map_or(true, |node| node.rrsets().is_empty()));
    assert_eq!(zone.serial(), Some(Serial::from(11)));
}

#[test]
fn transaction_state_is_enforced() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneCommit),
            zone_request(Command::ZoneBegin),
            zone_request(Command::ZoneBegin),
            zone_request(Command::ZoneAbort),
            zone_request(Command::ZoneAbort),
            zone_request(Command::ZoneGet),
        ],
    );
    let no_transaction = Some("no transaction open".to_owned());
    assert_eq!(
        errors(&channel),
        [
            no_transaction.clone(),
            None,
            Some("transaction already exists".to_owned()),
            None,
            no_transaction.clone(),
            no_transaction,
        ]
    );
    assert!(!zone.has_open_update());
    assert!(zone.journal().unwrap().is_empty());
}

#[test]
fn abort_discards_staged_changes() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);
    let before = zone.contents().unwrap();
    let journal_before = fs::read(dir.path().join("almanac.test.journal")).unwrap();

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            request(
                Command::ZoneSet,
                "almanac.test.",
                Some("new"),
                Some("A"),
                Some("60"),
                Some("192.0.2.7"),
            ),
            zone_request(Command::ZoneAbort),
        ],
    );
    assert_eq!(errors(&channel), [None, None, None]);
    assert!(Arc::ptr_eq(&before, &zone.contents().unwrap()));
    assert_eq!(
        fs::read(dir.path().join("almanac.test.journal")).unwrap(),
        journal_before
    );
}

#[test]
fn failed_unit_does_not_stop_the_batch() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);
    zone.begin(Default::default()).unwrap();

    // One zone-set request carried by three data units.
    let mut channel = MemoryChannel::default();
    let units = [
        request(
            Command::ZoneSet,
            "almanac.test.",
            Some("www"),
            Some("A"),
            Some("3600"),
            Some("192.0.2.10"),
        ),
        request(
            Command::ZoneSet,
            "almanac.test.",
            Some("www"),
            Some("BOGUS"),
            None,
            Some("x"),
        ),
        request(
            Command::ZoneSet,
            "almanac.test.",
            Some("www"),
            Some("A"),
            None,
            Some("192.0.2.11"),
        ),
    ];
    for unit in units {
        channel.incoming.push_back(Ok((UnitType::Data, unit)));
    }
    channel
        .incoming
        .push_back(Ok((UnitType::Block, Data::default())));
    assert_eq!(
        ctl::process(&catalog, &mut channel).unwrap(),
        Outcome::Continue
    );

    let responses = channel.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].len(), 1);
    let (unit_type, ref data) = responses[0][0];
    assert_eq!(unit_type, UnitType::Data);
    assert_eq!(data.error.as_deref(), Some("parse failure"));
    assert_eq!(data.rr_type.as_deref(), Some("BOGUS"));

    let staged: BTreeSet<String> = zone
        .update(|update| {
            Ok(update
                .get(Some(&*WWW))?
                .iter()
                .flat_map(|node| node.rrset(Type::A))
                .flat_map(|rrset| rrset.rdatas.iter().map(|rdata| rdata.to_string()))
                .collect())
        })
        .unwrap();
    assert_eq!(
        staged,
        BTreeSet::from([
            "1.2.3.4".to_owned(),
            "192.0.2.10".to_owned(),
            "192.0.2.11".to_owned(),
        ])
    );
}

#[test]
fn set_and_unset_check_their_arguments() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            // No TTL, and no staged RRset to take it from.
            request(
                Command::ZoneSet,
                "almanac.test.",
                Some("new"),
                Some("A"),
                None,
                Some("192.0.2.9"),
            ),
            // No TTL, taken from the staged www A RRset.
            request(
                Command::ZoneSet,
                "almanac.test.",
                Some("www"),
                Some("A"),
                None,
                Some("9.9.9.9"),
            ),
            // Records are removed by their data alone.
            request(
                Command::ZoneUnset,
                "almanac.test.",
                Some("www"),
                Some("A"),
                Some("3600"),
                Some("1.2.3.4"),
            ),
            // Data needs a type.
            request(
                Command::ZoneUnset,
                "almanac.test.",
                Some("www"),
                None,
                None,
                Some("1.2.3.4"),
            ),
            // Out of the zone.
            request(
                Command::ZoneSet,
                "almanac.test.",
                Some("www.elsewhere.test."),
                Some("A"),
                Some("60"),
                Some("192.0.2.1"),
            ),
            zone_request(Command::ZoneCommit),
        ],
    );
    let invalid = Some("invalid argument".to_owned());
    assert_eq!(
        errors(&channel),
        [
            None,
            Some("TTL not resolvable".to_owned()),
            None,
            invalid.clone(),
            invalid.clone(),
            invalid,
            None,
        ]
    );
    assert_eq!(
        a_records(&zone, &WWW),
        BTreeSet::from(["1.2.3.4".to_owned(), "9.9.9.9".to_owned()])
    );
}

#[test]
fn unset_reports_unknown_types_as_parse_failures() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            request(
                Command::ZoneUnset,
                "almanac.test.",
                Some("www"),
                Some("BOGUS"),
                None,
                Some("1.2.3.4"),
            ),
            request(
                Command::ZoneUnset,
                "almanac.test.",
                Some("www"),
                Some("BOGUS"),
                None,
                None,
            ),
            zone_request(Command::ZoneAbort),
        ],
    );
    let parse_failure = Some("parse failure".to_owned());
    assert_eq!(
        errors(&channel),
        [None, parse_failure.clone(), parse_failure, None]
    );
    assert_eq!(a_records(&zone, &WWW), BTreeSet::from(["1.2.3.4".to_owned()]));
}

#[test]
fn strict_commit_rejects_broken_zone() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);
    let before = zone.contents().unwrap();

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            request(
                Command::ZoneUnset,
                "almanac.test.",
                Some("@"),
                Some("NS"),
                None,
                None,
            ),
            zone_request(Command::ZoneCommit),
        ],
    );
    assert_eq!(
        errors(&channel),
        [None, None, Some("semantic check failed".to_owned())]
    );
    assert!(Arc::ptr_eq(&before, &zone.contents().unwrap()));
    assert!(!zone.has_open_update());
}

////////////////////////////////////////////////////////////////////////
// READING AND DIFFS                                                  //
////////////////////////////////////////////////////////////////////////

#[test]
fn diff_lists_removals_then_additions() {
    let dir = TempDir::new().unwrap();
    let (catalog, _zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            request(
                Command::ZoneUnset,
                "almanac.test.",
                Some("www"),
                Some("A"),
                None,
                Some("1.2.3.4"),
            ),
            request(
                Command::ZoneSet,
                "almanac.test.",
                Some("www"),
                Some("A"),
                Some("3600"),
                Some("5.6.7.8"),
            ),
            zone_request(Command::ZoneDiff),
        ],
    );
    let responses = channel.responses();
    let diff: Vec<_> = responses[3]
        .iter()
        .map(|(_, data)| {
            (
                data.flags.as_deref().unwrap(),
                data.owner.as_deref().unwrap(),
                data.ttl.as_deref().unwrap(),
                data.rr_type.as_deref().unwrap(),
                data.data.as_deref().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        diff,
        [
            ("-", "www.almanac.test.", "3600", "A", "1.2.3.4"),
            ("+", "www.almanac.test.", "3600", "A", "5.6.7.8"),
        ]
    );
}

#[test]
fn read_and_get_honour_owner_and_type() {
    let dir = TempDir::new().unwrap();
    let (catalog, _zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            request(
                Command::ZoneRead,
                "almanac.test.",
                Some("www"),
                Some("A"),
                None,
                None,
            ),
            request(
                Command::ZoneRead,
                "almanac.test.",
                Some("missing"),
                None,
                None,
                None,
            ),
            zone_request(Command::ZoneBegin),
            request(
                Command::ZoneSet,
                "almanac.test.",
                Some("www"),
                Some("AAAA"),
                Some("300"),
                Some("2001:db8::80"),
            ),
            request(
                Command::ZoneGet,
                "almanac.test.",
                Some("www"),
                Some("AAAA"),
                None,
                None,
            ),
            zone_request(Command::ZoneRead),
        ],
    );
    let responses = channel.responses();

    assert_eq!(responses[0].len(), 1);
    let www_a = &responses[0][0].1;
    assert_eq!(www_a.owner.as_deref(), Some("www.almanac.test."));
    assert_eq!(www_a.ttl.as_deref(), Some("3600"));
    assert_eq!(www_a.data.as_deref(), Some("1.2.3.4"));
    assert_eq!(www_a.flags, None);

    assert_eq!(responses[1][0].1.error.as_deref(), Some("not found"));

    assert_eq!(responses[4].len(), 1);
    assert_eq!(responses[4][0].1.data.as_deref(), Some("2001:db8::80"));

    // zone-read still shows the published contents: SOA, NS, and the
    // ns, www, and old records.
    assert_eq!(responses[5].len(), 5);
    assert!(responses[5]
        .iter()
        .all(|(_, data)| data.rr_type.as_deref() != Some("AAAA")));
}

////////////////////////////////////////////////////////////////////////
// STATUS AND HOUSEKEEPING                                            //
////////////////////////////////////////////////////////////////////////

#[test]
fn zone_status_reports_each_item() {
    let dir = TempDir::new().unwrap();
    let (catalog, _zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneStatus),
            zone_request(Command::ZoneBegin),
            zone_request(Command::ZoneStatus),
        ],
    );
    let responses = channel.responses();
    let items: Vec<_> = responses[0]
        .iter()
        .map(|(unit_type, data)| {
            (
                *unit_type,
                data.rr_type.as_deref().unwrap(),
                data.data.as_deref().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        items,
        [
            (UnitType::Data, "type", "master"),
            (UnitType::Extra, "serial", "10"),
            (UnitType::Extra, "next-event", "idle"),
            (UnitType::Extra, "auto-dnssec", "disabled"),
            (UnitType::Extra, "transaction", "none"),
        ]
    );
    assert_eq!(responses[2][4].1.data.as_deref(), Some("open"));
}

#[test]
fn commands_without_zone_apply_to_every_zone() {
    let dir = TempDir::new().unwrap();
    let (catalog, _zone) = catalog(&dir);
    catalog.insert(Zone::new("empty.test.".parse().unwrap(), ZoneConfig::default()).unwrap());

    let channel = run(
        &catalog,
        [Data::request(Command::ZoneStatus), Data::request(Command::ZoneCommit)],
    );
    let responses = channel.responses();

    let serials: Vec<_> = responses[0]
        .iter()
        .filter(|(_, data)| data.rr_type.as_deref() == Some("serial"))
        .map(|(_, data)| (data.zone.as_deref().unwrap(), data.data.as_deref().unwrap()))
        .collect();
    assert_eq!(serials, [("almanac.test.", "10"), ("empty.test.", "none")]);

    // Each zone reports its own failure.
    let failed: Vec<_> = responses[1]
        .iter()
        .map(|(_, data)| (data.zone.as_deref().unwrap(), data.error.as_deref().unwrap()))
        .collect();
    assert_eq!(
        failed,
        [
            ("almanac.test.", "no transaction open"),
            ("empty.test.", "no transaction open"),
        ]
    );
}

#[test]
fn unknown_zones_and_commands_are_reported() {
    let dir = TempDir::new().unwrap();
    let (catalog, _zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            request(Command::ZoneStatus, "nowhere.test.", None, None, None, None),
            Data {
                command: Some("zone-frobnicate".to_owned()),
                ..Data::default()
            },
        ],
    );
    let responses = channel.responses();
    assert_eq!(responses[0].len(), 1);
    assert_eq!(responses[0][0].1.error.as_deref(), Some("no such zone"));
    assert_eq!(responses[0][0].1.zone.as_deref(), Some("nowhere.test."));
    assert_eq!(responses[1][0].1.error.as_deref(), Some("invalid argument"));
}

#[test]
fn housekeeping_commands_schedule_events() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            Data {
                flags: Some("F".to_owned()),
                ..zone_request(Command::ZoneFlush)
            },
            zone_request(Command::ZoneReload),
            zone_request(Command::ZoneRefresh),
            zone_request(Command::ZoneSign),
        ],
    );
    let unsupported = Some("operation not supported".to_owned());
    assert_eq!(
        errors(&channel),
        [None, None, unsupported.clone(), unsupported]
    );
    assert!(zone.events().when(EventType::Flush).is_some());
    assert!(zone.events().when(EventType::Load).is_some());
    assert!(zone.events().when(EventType::Refresh).is_none());

    // The due events run against the zone itself.
    let unhandled = catalog.run_due_events(std::time::Instant::now());
    assert!(unhandled.is_empty());
    let text = fs::read_to_string(dir.path().join("almanac.test.zone")).unwrap();
    assert!(text.contains("www.almanac.test."));
    assert!(zone.contents().is_some());
}

#[test]
fn purge_empties_the_zone() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);

    let channel = run(
        &catalog,
        [
            zone_request(Command::ZoneBegin),
            zone_request(Command::ZonePurge),
            zone_request(Command::ZoneStatus),
            zone_request(Command::ZoneBegin),
        ],
    );
    assert_eq!(errors(&channel), [None, None, None, None]);
    assert!(zone.contents().is_none());
    assert!(!dir.path().join("almanac.test.zone").exists());

    let responses = channel.responses();
    assert_eq!(responses[2][1].1.data.as_deref(), Some("none"));
    assert_eq!(responses[2][4].1.data.as_deref(), Some("none"));

    // With nothing to build on, the new transaction is a full one, and
    // its diff lists the staged records as additions.
    let mut channel = MemoryChannel::with_requests([
        request(
            Command::ZoneSet,
            "almanac.test.",
            Some("@"),
            Some("SOA"),
            Some("3600"),
            Some("ns hostmaster 20 3600 900 604800 300"),
        ),
        zone_request(Command::ZoneDiff),
    ]);
    ctl::process(&catalog, &mut channel).unwrap();
    let responses = channel.responses();
    assert_eq!(responses[1].len(), 1);
    assert_eq!(responses[1][0].1.flags.as_deref(), Some("+"));
    assert_eq!(responses[1][0].1.rr_type.as_deref(), Some("SOA"));
}

////////////////////////////////////////////////////////////////////////
// SESSIONS                                                           //
////////////////////////////////////////////////////////////////////////

#[test]
fn server_commands_control_the_outcome() {
    let dir = TempDir::new().unwrap();
    let (catalog, _zone) = catalog(&dir);

    let mut channel = MemoryChannel::with_requests([
        Data::request(Command::Status),
        Data::request(Command::Reload),
    ]);
    assert_eq!(
        ctl::process(&catalog, &mut channel).unwrap(),
        Outcome::Reload
    );
    assert_eq!(channel.sent.len(), 2);

    let mut channel = MemoryChannel::with_requests([
        Data::request(Command::Stop),
        zone_request(Command::ZoneStatus),
    ]);
    assert_eq!(ctl::process(&catalog, &mut channel).unwrap(), Outcome::Stop);
    assert_eq!(channel.sent, [(UnitType::Block, Data::default())]);
}

#[test]
fn malformed_unit_ends_the_session() {
    let dir = TempDir::new().unwrap();
    let (catalog, zone) = catalog(&dir);

    let mut channel = MemoryChannel::default();
    channel.push(zone_request(Command::ZoneBegin));
    channel
        .incoming
        .push_back(Err(ChannelError::Malformed("bad unit".to_owned())));
    channel.push(zone_request(Command::ZoneAbort));

    assert!(matches!(
        ctl::process(&catalog, &mut channel),
        Err(ChannelError::Malformed(_))
    ));
    assert_eq!(channel.sent.len(), 1);
    assert!(zone.has_open_update());
}
