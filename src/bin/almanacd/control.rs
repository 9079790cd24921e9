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

//! Implements the control channel over standard input and output.
//!
//! Each unit is one line of JSON: an object whose `unit` key holds the
//! unit type, and whose other keys are the unit's data fields, e.g.
//!
//! ```text
//! {"unit": "data", "command": "zone-begin", "zone": "example.com."}
//! ```

use std::io::{BufRead, Write};

use serde_json::{Map, Value};

use almanac::ctl::{Channel, ChannelError, Data, UnitType};

/// The longest line that will be sent, in octets.
const MAX_LINE_LEN: usize = 65536;

/// A [`Channel`] exchanging JSON lines over a reader and a writer.
pub struct LineChannel<R, W> {
    reader: R,
    writer: W,
    closed: bool,
}

impl<R: BufRead, W: Write> LineChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            closed: false,
        }
    }

    /// Returns whether the reader has reached end-of-file.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<R: BufRead, W: Write> Channel for LineChannel<R, W> {
    fn receive(&mut self) -> Result<(UnitType, Data), ChannelError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                self.closed = true;
                return Ok((UnitType::End, Data::default()));
            }
            if !line.trim().is_empty() {
                return parse_unit(&line);
            }
        }
    }

    fn send(&mut self, unit_type: UnitType, data: &Data) -> Result<(), ChannelError> {
        let line = format_unit(unit_type, data)?;
        if line.len() > MAX_LINE_LEN {
            return Err(ChannelError::OutOfSpace);
        }
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

fn parse_unit(line: &str) -> Result<(UnitType, Data), ChannelError> {
    let malformed = |e: serde_json::Error| ChannelError::Malformed(e.to_string());
    let mut object: Map<String, Value> = serde_json::from_str(line).map_err(malformed)?;
    let unit_type = match object.remove("unit") {
        Some(value) => serde_json::from_value(value).map_err(malformed)?,
        None => return Err(ChannelError::Malformed("missing unit type".to_owned())),
    };
    let data = serde_json::from_value(Value::Object(object)).map_err(malformed)?;
    Ok((unit_type, data))
}

fn format_unit(unit_type: UnitType, data: &Data) -> Result<String, ChannelError> {
    let malformed = |e: serde_json::Error| ChannelError::Malformed(e.to_string());
    let mut object = Map::new();
    object.insert(
        "unit".to_owned(),
        serde_json::to_value(unit_type).map_err(malformed)?,
    );
    if let Value::Object(fields) = serde_json::to_value(data).map_err(malformed)? {
        object.extend(fields);
    }
    Ok(Value::Object(object).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac::ctl::Command;

    #[test]
    fn receive_parses_units_and_skips_blank_lines() {
        let input = "\n{\"unit\": \"data\", \"command\": \"zone-set\", \"zone\": \"a.test\", \
                     \"owner\": \"www\", \"type\": \"A\", \"data\": \"192.0.2.1\"}\n  \n\
                     {\"unit\": \"end\"}\n";
        let mut channel = LineChannel::new(input.as_bytes(), Vec::new());

        let (unit_type, data) = channel.receive().unwrap();
        assert_eq!(unit_type, UnitType::Data);
        assert_eq!(data.command.as_deref(), Some("zone-set"));
        assert_eq!(data.rr_type.as_deref(), Some("A"));
        assert_eq!(data.data.as_deref(), Some("192.0.2.1"));
        assert_eq!(channel.receive().unwrap().0, UnitType::End);
        assert!(!channel.is_closed());

        assert_eq!(channel.receive().unwrap().0, UnitType::End);
        assert!(channel.is_closed());
    }

    #[test]
    fn receive_rejects_malformed_units() {
        for line in [
            "not json\n",
            "{\"command\": \"status\"}\n",
            "{\"unit\": \"bogus\"}\n",
            "{\"unit\": \"data\", \"colour\": \"red\"}\n",
        ] {
            let mut channel = LineChannel::new(line.as_bytes(), Vec::new());
            assert!(matches!(
                channel.receive(),
                Err(ChannelError::Malformed(_))
            ));
        }
    }

    #[test]
    fn send_writes_one_line_per_unit() {
        let mut output = Vec::new();
        let mut channel = LineChannel::new(&b""[..], &mut output);
        let mut data = Data::request(Command::ZoneStatus);
        data.zone = Some("a.test.".to_owned());
        channel.send(UnitType::Data, &data).unwrap();
        channel.send(UnitType::Block, &Data::default()).unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            lines,
            [
                serde_json::json!({"unit": "data", "command": "zone-status", "zone": "a.test."}),
                serde_json::json!({"unit": "block"}),
            ]
        );
    }

    #[test]
    fn send_refuses_oversized_units() {
        let mut channel = LineChannel::new(&b""[..], Vec::new());
        let data = Data {
            data: Some("x".repeat(MAX_LINE_LEN)),
            ..Data::default()
        };
        assert!(matches!(
            channel.send(UnitType::Data, &data),
            Err(ChannelError::OutOfSpace)
        ));
    }
}
