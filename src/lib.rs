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

//! Almanac is the zone-keeping core of an authoritative DNS server:
//! zone contents published as immutable snapshots, transactions that
//! stage and commit changes to them, a durable journal of the resulting
//! changesets, and a control surface to drive it all.
//!
//! The main entry points are [`zone::Zone`], [`catalog::Catalog`], and
//! [`ctl::process`].

pub mod catalog;
pub mod ctl;
pub mod journal;
pub mod name;
pub mod rr;
mod util;
pub mod zone;
pub mod zone_file;
