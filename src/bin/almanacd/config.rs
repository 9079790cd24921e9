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

//! Implements the daemon configuration file.

use std::ffi::OsString;
use std::fmt::{self, Write};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use almanac::name::Name;
use almanac::zone::{AclRule, SerialPolicy, ZoneAcls};

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the daemon configuration from the file given by `path`.
///
/// The `reloading` parameter controls how the configuration is
/// summarized in the log: if reloading, only the zone configuration
/// is summarized. This parameter does *not* otherwise affect
/// processing.
pub fn load_from_path(path: impl AsRef<Path>, reloading: bool) -> Result<Config> {
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let config = parse(&raw_config, path.as_ref())?;
    if reloading {
        log_zone_summary(&config.zones);
    } else {
        log_config_summary(&config);
    }
    Ok(config)
}

/// Parses a configuration file read from `path`.
///
/// When loading the configuration from a path, all zone file and
/// journal paths are interpreted relative to the configuration file's
/// directory.
fn parse(raw_config: &[u8], path: &Path) -> Result<Config> {
    let dir = match path.parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let mut config: Config =
        toml::from_slice(raw_config).context("failed to parse the configuration file")?;
    for zone_config in &mut config.zones {
        if zone_config.path.is_relative() {
            zone_config.path = dir.join(&zone_config.path);
        }
        if let Some(ref mut journal) = zone_config.journal {
            if journal.is_relative() {
                *journal = dir.join(&journal);
            }
        }
    }
    Ok(config)
}

/// Loads the daemon configuration from the parsed command line
/// arguments given by `args`.
pub fn load_from_args(args: RunArgs) -> Config {
    let config = Config {
        journal: JournalConfig {
            max_size: args.journal_max_size.unwrap_or_else(default_journal_max_size),
        },
        zones: args
            .zones
            .into_iter()
            .map(|zd| ZoneConfig::new(ConfigName(zd.name), zd.path))
            .collect(),
    };
    log_config_summary(&config);
    config
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Journal size: {} octets\n\
         Zones:        ",
        config.journal.max_size,
    );
    summarize_zones(&config.zones, &mut message);
    debug!("{}", message);
}

/// Summarizes only the zones in the log, if the debug log level is
/// enabled. Used when reloading.
fn log_zone_summary(zones: &[ZoneConfig]) {
    if log_enabled!(Debug) {
        let mut message = String::from("Configuration reloaded:\nZones: ");
        summarize_zones(zones, &mut message);
        debug!("{}", message);
    }
}

/// Produces the zone summary for [`log_config_summary`] and
/// [`log_zone_summary`].
fn summarize_zones(zones: &[ZoneConfig], message: &mut String) {
    if zones.is_empty() {
        message.push_str("none to load");
    } else {
        let _ = write!(message, "{} to load", zones.len());
        for zone_config in zones {
            let role = if zone_config.masters.is_empty() {
                "master"
            } else {
                "slave"
            };
            let _ = write!(message, "\n  {} ({})", zone_config.name.0, role);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

/// Settings shared by the journals of all zones.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalConfig {
    #[serde(default = "default_journal_max_size")]
    pub max_size: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_size: default_journal_max_size(),
        }
    }
}

fn default_journal_max_size() -> u64 {
    100 * 1024 * 1024
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ZONES                                       //
////////////////////////////////////////////////////////////////////////

/// The configuration of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub name: ConfigName,
    pub path: PathBuf,
    pub journal: Option<PathBuf>,
    #[serde(default)]
    pub zonefile_sync: i64,
    #[serde(default)]
    pub serial_policy: SerialPolicy,
    #[serde(default)]
    pub dnssec_signing: bool,
    #[serde(default)]
    pub masters: Vec<SocketAddr>,
    #[serde(default)]
    pub acl_xfr_out: Vec<ConfigAclRule>,
    #[serde(default)]
    pub acl_notify_in: Vec<ConfigAclRule>,
    #[serde(default)]
    pub acl_update_in: Vec<ConfigAclRule>,
}

impl ZoneConfig {
    /// Creates the default configuration for a zone kept in `path`.
    pub fn new(name: ConfigName, path: PathBuf) -> Self {
        Self {
            name,
            path,
            journal: None,
            zonefile_sync: 0,
            serial_policy: SerialPolicy::default(),
            dnssec_signing: false,
            masters: Vec::new(),
            acl_xfr_out: Vec::new(),
            acl_notify_in: Vec::new(),
            acl_update_in: Vec::new(),
        }
    }

    /// Returns the journal path: the configured one, or the zone file
    /// path with `.journal` appended.
    pub fn journal_path(&self) -> PathBuf {
        self.journal.clone().unwrap_or_else(|| {
            let mut path = OsString::from(self.path.as_os_str());
            path.push(".journal");
            PathBuf::from(path)
        })
    }

    /// Builds the library's zone configuration from this one.
    pub fn to_zone_config(&self, journal_max_size: u64) -> almanac::zone::ZoneConfig {
        let acl = |rules: &[ConfigAclRule]| rules.iter().map(|rule| rule.0.clone()).collect();
        almanac::zone::ZoneConfig {
            zone_file: Some(self.path.clone()),
            journal: Some(self.journal_path()),
            journal_max_size,
            zonefile_sync: self.zonefile_sync,
            serial_policy: self.serial_policy,
            masters: self.masters.clone(),
            acls: ZoneAcls {
                transfer_out: acl(&self.acl_xfr_out),
                notify_in: acl(&self.acl_notify_in),
                update_in: acl(&self.acl_update_in),
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER ALMANAC TYPES FOR SERDE                              //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`almanac`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over an [`almanac`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigAclRule, AclRule, "ACL rule");
