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

//! The control surface: remote administration of zones and the server.
//!
//! A control session is a sequence of *units* exchanged over a
//! [`Channel`]. Each unit has a [`UnitType`] and carries a [`Data`]
//! record of optional text fields. A client sends a batch of data units,
//! each naming a [`Command`], and terminates the batch with an end unit.
//! [`process`] runs the commands in order, sending the responses (as
//! data and extra units) followed by a block unit after each command.
//!
//! Zone commands that name a zone also take the data units that
//! immediately follow as further requests of the same command, so a
//! client can, e.g., stage many records with one `zone-set` request.
//! A failure is reported as a data unit with the `error` field set, and
//! processing goes on. Only a failure of the channel itself (such as a
//! unit that cannot be parsed) ends the session.

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::zone::Zone;

mod command;
mod error;
mod zone;
pub use command::{Command, UnknownCommandError};
pub use error::{ChannelError, Error};

////////////////////////////////////////////////////////////////////////
// UNITS AND CHANNELS                                                 //
////////////////////////////////////////////////////////////////////////

/// The types of units exchanged over a control channel.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    /// A request, or the first unit of a response.
    Data,

    /// A continuation of a response.
    Extra,

    /// The end of the response to one request.
    Block,

    /// The end of the batch (when received) or session (when sent).
    End,
}

/// The fields of a control unit. All of them are optional.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Data {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub rr_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Data {
    /// Creates a request for `command`.
    pub fn request(command: Command) -> Self {
        Self {
            command: Some(command.name().to_owned()),
            ..Self::default()
        }
    }

    /// Returns whether the `flags` field contains `flag`.
    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.as_deref().map_or(false, |flags| flags.contains(flag))
    }
}

/// A bidirectional control channel.
pub trait Channel {
    /// Receives the next unit. A unit that cannot be understood must be
    /// reported as [`ChannelError::Malformed`].
    fn receive(&mut self) -> Result<(UnitType, Data), ChannelError>;

    /// Sends a unit.
    fn send(&mut self, unit_type: UnitType, data: &Data) -> Result<(), ChannelError>;
}

////////////////////////////////////////////////////////////////////////
// BATCH PROCESSING                                                   //
////////////////////////////////////////////////////////////////////////

/// What the server should do after a control session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Continue,
    Stop,
    Reload,
}

/// Processes one batch of requests received over `channel`, until the
/// client sends an end unit. Returns early (with [`Outcome::Stop`]) when
/// the client requests that the server stop, and with an error when the
/// channel fails.
pub fn process<C: Channel>(catalog: &Catalog, channel: &mut C) -> Result<Outcome, ChannelError> {
    let mut outcome = Outcome::Continue;
    let mut next = None;
    loop {
        let (unit_type, data) = match next.take() {
            Some(unit) => unit,
            None => channel.receive()?,
        };
        match unit_type {
            UnitType::End => return Ok(outcome),
            UnitType::Data => (),
            UnitType::Extra | UnitType::Block => continue,
        }
        log_data(&data);

        let command = match data.command.as_deref().map(str::parse::<Command>) {
            Some(Ok(command)) => command,
            _ => {
                debug!("control, invalid command {:?}", data.command);
                let mut context = Context::new(catalog, channel, data);
                context.report(None, Error::InvalidArgument)?;
                channel.send(UnitType::Block, &Data::default())?;
                continue;
            }
        };

        let mut context = Context::new(catalog, channel, data);
        let command_outcome = match (command, zone::handler(command)) {
            (_, Some(handler)) => {
                next = context.zones_apply(handler)?;
                Outcome::Continue
            }
            (Command::Stop, None) => Outcome::Stop,
            (Command::Reload, None) => Outcome::Reload,
            (_, None) => Outcome::Continue,
        };
        channel.send(UnitType::Block, &Data::default())?;

        match command_outcome {
            Outcome::Stop => {
                info!("control, stopping the server");
                return Ok(Outcome::Stop);
            }
            Outcome::Reload => outcome = Outcome::Reload,
            Outcome::Continue => (),
        }
    }
}

fn log_data(data: &Data) {
    let command = data.command.as_deref().unwrap_or("");
    match data.zone {
        Some(ref zone) => debug!("control, received command '{}' for zone {}", command, zone),
        None => debug!("control, received command '{}'", command),
    }
}

/// A zone command handler.
type Handler<C> = fn(&Zone, &mut Context<C>) -> Result<(), Error>;

/// The state of the request being processed.
struct Context<'a, C> {
    catalog: &'a Catalog,
    channel: &'a mut C,
    data: Data,
}

impl<'a, C: Channel> Context<'a, C> {
    fn new(catalog: &'a Catalog, channel: &'a mut C, data: Data) -> Self {
        Self {
            catalog,
            channel,
            data,
        }
    }

    /// Applies `handler` to the zone named by the request, and to the
    /// zones named by the data units that directly follow. Without a
    /// zone name, `handler` is applied to every zone instead.
    ///
    /// Returns the unit that ended the run of data units, if one was
    /// received.
    fn zones_apply(
        &mut self,
        handler: Handler<C>,
    ) -> Result<Option<(UnitType, Data)>, ChannelError> {
        if self.data.zone.is_none() {
            for zone in self.catalog.zones() {
                if let Err(err) = handler(&zone, self) {
                    self.report(Some(&*zone), err)?;
                }
            }
            return Ok(None);
        }

        loop {
            let zone = self.data.zone.as_deref().and_then(|name| self.catalog.find(name));
            let result = match zone {
                Some(ref zone) => handler(zone, self),
                None => Err(Error::NoSuchZone),
            };
            if let Err(err) = result {
                self.report(zone.as_deref(), err)?;
            }

            let (unit_type, data) = self.channel.receive()?;
            if unit_type != UnitType::Data {
                return Ok(Some((unit_type, data)));
            }
            log_data(&data);
            self.data = data;
        }
    }

    /// Logs a failed request and sends an error unit for it. Channel
    /// failures are passed back instead.
    fn report(&mut self, zone: Option<&Zone>, err: Error) -> Result<(), ChannelError> {
        let err = err.into_fatal()?;
        let command = self.data.command.as_deref().unwrap_or("");
        match (zone, self.data.zone.as_deref()) {
            (Some(zone), _) => error!(
                "Zone {}: control, {} failed ({})",
                zone.name(),
                command,
                err
            ),
            (None, Some(name)) => {
                error!("Zone {}: control, {} failed ({})", name, command, err)
            }
            (None, None) => error!("control, {} failed ({})", command, err),
        }

        let mut data = self.data.clone();
        if let Some(zone) = zone {
            data.zone = Some(zone.name().to_string());
        }
        data.error = Some(err.to_string());
        match self.channel.send(UnitType::Data, &data) {
            Err(ChannelError::OutOfSpace) => {
                debug!("control, failed to send error (out of space)");
                Ok(())
            }
            result => result,
        }
    }

    fn send(&mut self, unit_type: UnitType, data: &Data) -> Result<(), Error> {
        self.channel.send(unit_type, data).map_err(Error::from)
    }
}
