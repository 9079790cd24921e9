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

//! Handlers for the zone commands.

use std::time::Instant;

use super::{Channel, Command, Context, Data, Error, Handler, UnitType};
use crate::name::Name;
use crate::rr::{Rdata, Record, Rrset, Type};
use crate::zone::{format_duration, EventType, Node, UpdateFlags, UpdateMode, Zone, ZoneFlag};

/// Flag requesting that an operation be forced.
const FLAG_FORCE: char = 'F';

/// Flag marking a record added by a transaction.
const FLAG_ADD: &str = "+";

/// Flag marking a record removed by a transaction.
const FLAG_REMOVE: &str = "-";

/// Returns the handler for a zone command, or `None` for a server
/// command.
pub(super) fn handler<C: Channel>(command: Command) -> Option<Handler<C>> {
    let handler: Handler<C> = match command {
        Command::ZoneStatus => status,
        Command::ZoneReload => reload,
        Command::ZoneRefresh => refresh,
        Command::ZoneRetransfer => retransfer,
        Command::ZoneFlush => flush,
        Command::ZoneSign => sign,
        Command::ZoneRead => read,
        Command::ZoneBegin => begin,
        Command::ZoneCommit => commit,
        Command::ZoneAbort => abort,
        Command::ZoneDiff => diff,
        Command::ZoneGet => get,
        Command::ZoneSet => set,
        Command::ZoneUnset => unset,
        Command::ZonePurge => purge,
        Command::Status | Command::Stop | Command::Reload => return None,
    };
    Some(handler)
}

////////////////////////////////////////////////////////////////////////
// STATUS AND HOUSEKEEPING                                            //
////////////////////////////////////////////////////////////////////////

fn status<C: Channel>(zone: &Zone, ctx: &mut Context<C>) -> Result<(), Error> {
    let now = Instant::now();
    let role = if zone.is_slave() { "slave" } else { "master" };
    let serial = zone
        .serial()
        .map_or_else(|| "none".to_owned(), |serial| serial.to_string());
    let next_event = zone.events().describe_next(now);
    let auto_dnssec = if zone.signing_enabled() {
        match zone.events().when(EventType::Dnssec) {
            Some(at) if at > now => format!("in {}", format_duration(at - now)),
            Some(_) => "pending".to_owned(),
            None => "not scheduled".to_owned(),
        }
    } else {
        "disabled".to_owned()
    };
    let transaction = if zone.has_open_update() {
        "open"
    } else {
        "none"
    };

    let items = [
        ("type", role.to_owned()),
        ("serial", serial),
        ("next-event", next_event),
        ("auto-dnssec", auto_dnssec),
        ("transaction", transaction.to_owned()),
    ];
    for (i, (item, value)) in items.into_iter().enumerate() {
        let data = Data {
            zone: Some(zone.name().to_string()),
            rr_type: Some(item.to_owned()),
            data: Some(value),
            ..Data::default()
        };
        let unit_type = if i == 0 {
            UnitType::Data
        } else {
            UnitType::Extra
        };
        ctx.send(unit_type, &data)?;
    }
    Ok(())
}

fn reload<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    if zone.is_expired() {
        return Err(Error::NotSupported);
    }
    zone.events().schedule_now(EventType::Load);
    Ok(())
}

fn refresh<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    if !zone.is_slave() {
        return Err(Error::NotSupported);
    }
    zone.events().schedule_now(EventType::Refresh);
    Ok(())
}

fn retransfer<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    if !zone.is_slave() {
        return Err(Error::NotSupported);
    }
    zone.set_flag(ZoneFlag::ForceAxfr);
    zone.events().schedule_now(EventType::Transfer);
    Ok(())
}

fn flush<C: Channel>(zone: &Zone, ctx: &mut Context<C>) -> Result<(), Error> {
    if ctx.data.has_flag(FLAG_FORCE) {
        zone.set_flag(ZoneFlag::ForceFlush);
    }
    zone.events().schedule_now(EventType::Flush);
    Ok(())
}

fn sign<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    if !zone.signing_enabled() {
        return Err(Error::NotSupported);
    }
    zone.set_flag(ZoneFlag::ForceResign);
    zone.events().schedule_now(EventType::Dnssec);
    Ok(())
}

fn purge<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    zone.purge().map_err(Error::from)
}

////////////////////////////////////////////////////////////////////////
// READING                                                            //
////////////////////////////////////////////////////////////////////////

/// Sends the published contents of the zone.
fn read<C: Channel>(zone: &Zone, ctx: &mut Context<C>) -> Result<(), Error> {
    let filter = type_filter(&ctx.data)?;
    let owner = owner(&ctx.data, zone)?;
    let contents = zone.contents();

    let mut units = Vec::new();
    match owner {
        Some(owner) => {
            let node = contents
                .as_ref()
                .and_then(|contents| contents.find_node(&owner))
                .ok_or(Error::NotFound)?;
            push_node(&mut units, zone, node, filter, None);
        }
        None => {
            for node in contents.iter().flat_map(|contents| contents.iter()) {
                push_node(&mut units, zone, node, filter, None);
            }
        }
    }
    send_all(ctx, &units)
}

/// Sends the staged contents of the open transaction.
fn get<C: Channel>(zone: &Zone, ctx: &mut Context<C>) -> Result<(), Error> {
    send_staged(zone, ctx, None)
}

fn send_staged<C: Channel>(
    zone: &Zone,
    ctx: &mut Context<C>,
    flags: Option<&str>,
) -> Result<(), Error> {
    require_transaction(zone)?;
    let filter = type_filter(&ctx.data)?;
    let owner = owner(&ctx.data, zone)?;
    let units = zone.update(|update| {
        let mut units = Vec::new();
        for node in update.get(owner.as_ref())? {
            push_node(&mut units, zone, node, filter, flags);
        }
        Ok(units)
    })?;
    send_all(ctx, &units)
}

/// Sends the changes staged by the open transaction: first the removed
/// records, then the added ones. A full transaction has nothing to
/// compare against, so its whole staged contents are sent as additions.
fn diff<C: Channel>(zone: &Zone, ctx: &mut Context<C>) -> Result<(), Error> {
    require_transaction(zone)?;
    if zone.update(|update| Ok(update.mode()))? == UpdateMode::Full {
        return send_staged(zone, ctx, Some(FLAG_ADD));
    }

    let filter = type_filter(&ctx.data)?;
    let changeset = zone.update(|update| Ok(update.diff()))?;
    let mut units = Vec::new();
    let apex = zone.name();

    // The SOA is only sent if it changed.
    if let (Some(from), Some(_)) = (changeset.soa_from(), changeset.soa_to()) {
        push_rrset(&mut units, zone, apex, from, filter, Some(FLAG_REMOVE));
    }
    for (owner, rrset) in changeset.iter_removals() {
        push_rrset(&mut units, zone, owner, rrset, filter, Some(FLAG_REMOVE));
    }
    if let Some(to) = changeset.soa_to() {
        push_rrset(&mut units, zone, apex, to, filter, Some(FLAG_ADD));
    }
    for (owner, rrset) in changeset.iter_additions() {
        push_rrset(&mut units, zone, owner, rrset, filter, Some(FLAG_ADD));
    }
    send_all(ctx, &units)
}

fn push_node(
    units: &mut Vec<Data>,
    zone: &Zone,
    node: &Node,
    filter: Option<Type>,
    flags: Option<&str>,
) {
    for rrset in node.rrsets().iter() {
        push_rrset(units, zone, node.name(), rrset, filter, flags);
    }
}

/// Adds a data unit for each record of `rrset` (if it passes the type
/// filter).
fn push_rrset(
    units: &mut Vec<Data>,
    zone: &Zone,
    owner: &Name,
    rrset: &Rrset,
    filter: Option<Type>,
    flags: Option<&str>,
) {
    if filter.map_or(false, |rr_type| rr_type != rrset.rr_type) {
        return;
    }
    for rdata in rrset.rdatas.iter() {
        units.push(Data {
            zone: Some(zone.name().to_string()),
            owner: Some(owner.to_string()),
            ttl: Some(rrset.ttl.to_string()),
            rr_type: Some(rrset.rr_type.to_string()),
            data: Some(rdata.to_string()),
            flags: flags.map(str::to_owned),
            ..Data::default()
        });
    }
}

fn send_all<C: Channel>(ctx: &mut Context<C>, units: &[Data]) -> Result<(), Error> {
    for unit in units {
        ctx.send(UnitType::Data, unit)?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TRANSACTIONS                                                       //
////////////////////////////////////////////////////////////////////////

fn begin<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    let flags = UpdateFlags {
        sign: zone.signing_enabled(),
        strict: true,
    };
    zone.begin(flags)?;
    Ok(())
}

fn commit<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    zone.commit()?;
    Ok(())
}

fn abort<C: Channel>(zone: &Zone, _ctx: &mut Context<C>) -> Result<(), Error> {
    zone.abort().map_err(Error::from)
}

/// Adds a record to the transaction. Without a TTL, the record takes
/// the TTL of its staged RRset.
fn set<C: Channel>(zone: &Zone, ctx: &mut Context<C>) -> Result<(), Error> {
    require_transaction(zone)?;
    let data = &ctx.data;
    let (owner, rr_type) = match (data.owner.as_deref(), data.rr_type.as_deref()) {
        (Some(owner), Some(rr_type)) => (owner_text(owner), rr_type),
        _ => return Err(Error::InvalidArgument),
    };
    zone.update(|update| {
        let record = Record::from_fields(
            owner,
            data.ttl.as_deref(),
            rr_type,
            data.data.as_deref().unwrap_or(""),
            zone.name(),
            |owner, rr_type| update.ttl_of(owner, rr_type),
        )?;
        update.add(&record)
    })?;
    Ok(())
}

/// Removes a record, an RRset, or a whole node from the transaction,
/// depending on which of the type and data fields are given. Records
/// are matched on their data alone, so a TTL may not be given.
fn unset<C: Channel>(zone: &Zone, ctx: &mut Context<C>) -> Result<(), Error> {
    require_transaction(zone)?;
    let data = &ctx.data;
    if data.ttl.is_some() {
        return Err(Error::InvalidArgument);
    }
    let owner = owner(data, zone)?.ok_or(Error::InvalidArgument)?;

    match (data.rr_type.as_deref(), data.data.as_deref()) {
        (Some(rr_type), Some(rdata)) => {
            let rr_type: Type = rr_type.parse().map_err(|_| Error::ParseFailure)?;
            let rdata =
                Rdata::parse(rr_type, rdata, zone.name()).map_err(|_| Error::ParseFailure)?;
            zone.update(|update| update.remove(&owner, rr_type, &rdata))?;
        }
        (Some(rr_type), None) => {
            let rr_type: Type = rr_type.parse().map_err(|_| Error::ParseFailure)?;
            zone.update(|update| update.remove_rrset(&owner, rr_type).map(|_| ()))?;
        }
        (None, Some(_)) => return Err(Error::InvalidArgument),
        (None, None) => {
            zone.update(|update| update.remove_node(&owner).map(|_| ()))?;
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

fn require_transaction(zone: &Zone) -> Result<(), Error> {
    if zone.has_open_update() {
        Ok(())
    } else {
        Err(Error::NoTransaction)
    }
}

/// An empty owner stands for the zone apex, like `@`.
fn owner_text(text: &str) -> &str {
    if text.is_empty() {
        "@"
    } else {
        text
    }
}

/// Parses the owner of a request, relative to the zone.
fn owner(data: &Data, zone: &Zone) -> Result<Option<Name>, Error> {
    data.owner
        .as_deref()
        .map(|text| {
            Name::parse_relative(owner_text(text), zone.name()).map_err(|_| Error::InvalidArgument)
        })
        .transpose()
}

/// Parses the type filter of a request.
fn type_filter(data: &Data) -> Result<Option<Type>, Error> {
    data.rr_type
        .as_deref()
        .map(|text| text.parse().map_err(|_| Error::InvalidArgument))
        .transpose()
}
