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

//! Implements zone loading and reloading.

use std::collections::HashSet;
use std::fmt::Write;

use anyhow::{anyhow, Context, Result};
use log::Level::Warn;
use log::{debug, error, info, log_enabled, warn};

use almanac::catalog::Catalog;
use almanac::name::Name;
use almanac::zone::{validate, EventType, ValidationIssue, Zone};

use crate::config::ZoneConfig;

/// Loads the zones configured in `zones` into `catalog`.
///
/// A zone whose contents fail to load is still added to the catalog,
/// without contents, so that it can be reloaded later. Returns the
/// number of zones that failed.
pub fn load(zones: &[ZoneConfig], journal_max_size: u64, catalog: &Catalog) -> usize {
    let mut zones_failed = 0;

    for zone_config in zones {
        debug!(
            "Loading {} from {}.",
            zone_config.name.0,
            zone_config.path.display(),
        );
        let zone = match create_zone(zone_config, journal_max_size) {
            Ok(zone) => zone,
            Err(e) => {
                log_failure(&zone_config.name.0, e);
                zones_failed += 1;
                continue;
            }
        };
        if let Err(e) = load_and_validate_zone(&zone) {
            log_failure(&zone_config.name.0, e);
            zones_failed += 1;
        }
        catalog.insert(zone);
    }

    if zones_failed > 0 {
        if zones_failed == 1 {
            error!("1 zone failed to load.");
        } else {
            error!("{} zones failed to load.", zones_failed);
        }
    }
    zones_failed
}

/// Brings `catalog` in line with a new zone configuration. Zones no
/// longer configured are removed. Zones that remain pick up their new
/// access-control lists and masters, and are scheduled to load again.
/// New zones are loaded as by [`load`].
pub fn reload(zones: &[ZoneConfig], journal_max_size: u64, catalog: &Catalog) {
    let configured: HashSet<&Name> = zones.iter().map(|z| &z.name.0).collect();
    for zone in catalog.zones() {
        if !configured.contains(zone.name()) {
            info!("Zone {}: no longer configured, removing it", zone.name());
            catalog.remove(zone.name());
        }
    }

    let mut new_zones = Vec::new();
    for zone_config in zones {
        match catalog.get(&zone_config.name.0) {
            Some(zone) => {
                let library_config = zone_config.to_zone_config(journal_max_size);
                zone.set_acls(library_config.acls);
                zone.set_masters(library_config.masters);
                zone.events().schedule_now(EventType::Load);
            }
            None => new_zones.push(zone_config.clone()),
        }
    }
    if !new_zones.is_empty() {
        info!("Loading {} new zone(s).", new_zones.len());
        load(&new_zones, journal_max_size, catalog);
    }
}

fn create_zone(zone_config: &ZoneConfig, journal_max_size: u64) -> Result<Zone> {
    let zone = Zone::new(
        zone_config.name.0.clone(),
        zone_config.to_zone_config(journal_max_size),
    )
    .with_context(|| {
        format!(
            "failed to open the journal {}",
            zone_config.journal_path().display()
        )
    })?;
    if zone_config.dnssec_signing {
        warn!(
            "Zone {}: DNSSEC signing is enabled, but no signer is available; \
             the zone will not be signed.",
            zone.name(),
        );
    }
    Ok(zone)
}

/// Loads a zone's contents and validates them. A zone whose contents
/// fail validation is expired, so that it is not served.
fn load_and_validate_zone(zone: &Zone) -> Result<()> {
    zone.load().context("failed to load the zone contents")?;
    if let Some(contents) = zone.contents() {
        let issues = validate(&contents);
        if let Err(e) = report_issues(zone.name(), &issues) {
            zone.expire();
            return Err(e);
        }
    }
    Ok(())
}

fn log_failure(name: &Name, e: anyhow::Error) {
    let mut message = format!("Failed to load {}:", name);
    for (i, cause) in e.chain().enumerate() {
        let _ = write!(message, "\n[{}] {}", i + 1, cause);
    }
    error!("{}", message);
}

/// Writes validation errors and warnings to the log. Returns an error
/// if there are errors (but not if there are only warnings).
fn report_issues(name: &Name, issues: &[ValidationIssue]) -> Result<()> {
    if issues.is_empty() {
        return Ok(());
    }

    let have_errors = issues.iter().any(ValidationIssue::is_error);
    let have_warnings = !issues.iter().all(ValidationIssue::is_error);
    if !have_errors && !log_enabled!(Warn) {
        return Ok(());
    }
    let mut message = String::new();

    // Display the header.
    if have_errors {
        let _ = write!(
            message,
            "Validation of {} failed for the following reasons:",
            name
        );
    } else {
        let _ = write!(
            message,
            "Validation of {} produced the following warnings:",
            name
        );
    }

    // List the issues.
    for (i, issue) in issues.iter().enumerate() {
        if have_errors && have_warnings {
            let severity = if issue.is_error() { "error" } else { "warning" };
            let _ = write!(message, "\n[{}] ({}) {}", i + 1, severity, issue);
        } else {
            let _ = write!(message, "\n[{}] {}", i + 1, issue);
        }
    }

    // Produce the final verdict.
    if have_errors {
        if have_warnings {
            message
                .push_str("\nItems marked \"error\" must be fixed before the zone can be served.");
        } else {
            message.push_str("\nAll items above must be fixed before the zone can be served.");
        }
        error!("{}", message);
        Err(anyhow!("zone validation failed (see above)"))
    } else {
        let _ = write!(
            message,
            "\nDespite these warnings, {} will still be served.",
            name
        );
        warn!("{}", message);
        Ok(())
    }
}
