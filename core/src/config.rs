/*
* Copyright 2019 Comcast Cable Communications Management, LLC
*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
* http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific language governing permissions and
* limitations under the License.
*
* SPDX-License-Identifier: Apache-2.0
*/

//! Toml-based configuration for flow tables.
//!
//! # Example
//!
//! A configuration from our [`udpgen`] demo:
//! ```toml
//! table_id = 1
//! strict_delete = "ignore"
//!
//! [[flows]]
//!     priority = 10
//!     actions = "output:2"
//!     hard_timeout = 100
//!
//!     [flows.match]
//!         eth_type = 0x0800
//!         ip_proto = 17
//!         ipv4_dst = "10.0.0.1/32"
//!         dst_port = 80
//!
//! [[probes]]
//!     at = 50
//!
//!     [probes.key]
//!         eth_type = 0x0800
//!         ip_proto = 17
//!         ipv4_dst = "10.0.0.1"
//!         src_port = 5000
//!         dst_port = 80
//! ```
//!
//! [`udpgen`]: https://github.com/capsule-rs/capsule/tree/master/demos/udpgen

use crate::flow::{Flow, MatchKey, MatchMask};
use crate::net::{EtherType, MacAddr, ProtocolNumber};
use crate::table::{FlowTable, MissPolicy};
use anyhow::{anyhow, Result};
use clap::{clap_app, crate_version};
use serde::{de, Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// make `MacAddr` serde deserializable.
impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MacAddr::from_str(&s).map_err(de::Error::custom)
    }
}

// make `EtherType` serde deserializable.
impl<'de> Deserialize<'de> for EtherType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u16::deserialize(deserializer)?;
        Ok(EtherType::new(value))
    }
}

// make `ProtocolNumber` serde deserializable.
impl<'de> Deserialize<'de> for ProtocolNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Ok(ProtocolNumber::new(value))
    }
}

/// Deserializes a duration from seconds expressed as `u64`.
pub fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

/// Deserializes an option of duration from seconds expressed as `u64`.
/// Zero seconds deserializes to `None`.
pub fn duration_option_from_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    // for now this is the cleanest way to deserialize an option, till a better
    // way is implemented, https://github.com/serde-rs/serde/issues/723
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "duration_from_secs")] Duration);

    let option = Option::deserialize(deserializer)?.and_then(|Wrapper(dur)| {
        if dur.as_secs() > 0 {
            Some(dur)
        } else {
            None
        }
    });
    Ok(option)
}

/// Error returned when parsing a malformed address prefix.
#[derive(Debug, Error)]
#[error("Failed to parse '{0}' as address prefix.")]
pub struct PrefixParseError(String);

/// An address with an optional prefix length, i.e. `10.0.0.0/24`. Without
/// a length the whole address is compared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Prefix<A> {
    /// The address.
    pub addr: A,
    /// Number of leading bits compared.
    pub len: u8,
}

/// Address types a `Prefix` can carry.
pub trait PrefixAddr: FromStr + Copy {
    /// Width of the address in bits.
    const BITS: u8;
}

impl PrefixAddr for Ipv4Addr {
    const BITS: u8 = 32;
}

impl PrefixAddr for Ipv6Addr {
    const BITS: u8 = 128;
}

impl<A: PrefixAddr> FromStr for Prefix<A> {
    type Err = PrefixParseError;

    fn from_str(s: &str) -> Result<Self, PrefixParseError> {
        let err = || PrefixParseError(s.to_owned());
        match s.split('/').collect::<Vec<&str>>().as_slice() {
            [addr] => {
                let addr = A::from_str(addr).map_err(|_| err())?;
                Ok(Prefix { addr, len: A::BITS })
            }
            [addr, len] => {
                let addr = A::from_str(addr).map_err(|_| err())?;
                let len = len.parse::<u8>().map_err(|_| err())?;
                if len > A::BITS {
                    return Err(err());
                }
                Ok(Prefix { addr, len })
            }
            _ => Err(err()),
        }
    }
}

impl<'de, A: PrefixAddr> Deserialize<'de> for Prefix<A> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Prefix::from_str(&s).map_err(de::Error::custom)
    }
}

/// Flow table configuration settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowTableConfig {
    /// The caller assigned table identifier.
    pub table_id: u8,

    /// What a strict delete that matches nothing does, `"ignore"` or
    /// `"error"`. Defaults to `"ignore"`.
    #[serde(default)]
    pub strict_delete: MissPolicy,

    /// Flows installed when the table is built. Defaults to none.
    #[serde(default)]
    pub flows: Vec<FlowConfig>,

    /// Synthetic lookups for a driver to replay against the table. Defaults
    /// to none.
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

impl FlowTableConfig {
    /// Reads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|err| err.into())
    }

    /// Builds the table, installing the configured flows at time zero.
    pub fn build(&self) -> FlowTable<String> {
        FlowTable::with_config(self)
    }
}

impl FlowTable<String> {
    /// Creates a table from configuration settings. The configured flows
    /// are installed at time zero.
    pub fn with_config(config: &FlowTableConfig) -> Self {
        let mut table = FlowTable::with_miss_policy(config.table_id, config.strict_delete);
        for flow in config.flows.iter() {
            table.add(flow.to_flow(), Duration::default());
        }
        table
    }
}

/// Flow configuration settings.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// The flow priority. Higher wins.
    pub priority: u16,

    /// The opaque action payload.
    pub actions: String,

    /// Seconds without a match before the flow expires. Defaults to `0`,
    /// meaning never.
    #[serde(default, deserialize_with = "duration_option_from_secs")]
    pub idle_timeout: Option<Duration>,

    /// Seconds after installation before the flow expires. Defaults to `0`,
    /// meaning never.
    #[serde(default, deserialize_with = "duration_option_from_secs")]
    pub hard_timeout: Option<Duration>,

    /// The fields to match. Omitted fields are wildcarded.
    #[serde(default, rename = "match")]
    pub matches: MatchConfig,
}

impl FlowConfig {
    /// Converts the settings to a flow.
    pub fn to_flow(&self) -> Flow<String> {
        let mut flow = Flow::new(
            self.matches.key(),
            self.matches.mask(),
            self.priority,
            self.actions.clone(),
        );
        if let Some(idle) = self.idle_timeout {
            flow = flow.with_idle_timeout(idle);
        }
        if let Some(hard) = self.hard_timeout {
            flow = flow.with_hard_timeout(hard);
        }
        flow
    }
}

impl fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("flow");
        d.field("priority", &self.priority)
            .field("actions", &self.actions);
        if let Some(idle) = &self.idle_timeout {
            d.field("idle_timeout", idle);
        }
        if let Some(hard) = &self.hard_timeout {
            d.field("hard_timeout", hard);
        }
        d.field("match", &self.matches).finish()
    }
}

/// Match field settings. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchConfig {
    pub in_port: Option<u32>,
    pub eth_dst: Option<MacAddr>,
    pub eth_src: Option<MacAddr>,
    pub eth_type: Option<EtherType>,
    pub vlan_id: Option<u16>,
    pub ip_proto: Option<ProtocolNumber>,
    pub ipv4_src: Option<Prefix<Ipv4Addr>>,
    pub ipv4_dst: Option<Prefix<Ipv4Addr>>,
    pub ipv6_src: Option<Prefix<Ipv6Addr>>,
    pub ipv6_dst: Option<Prefix<Ipv6Addr>>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl MatchConfig {
    /// Returns the key with the given fields set and the rest zeroed.
    /// Prefix lengths are ignored.
    pub fn key(&self) -> MatchKey {
        let mut key = MatchKey::zeroed();
        if let Some(v) = self.in_port {
            key.in_port = v;
        }
        if let Some(v) = self.eth_dst {
            key.eth_dst = v;
        }
        if let Some(v) = self.eth_src {
            key.eth_src = v;
        }
        if let Some(v) = self.eth_type {
            key.eth_type = v;
        }
        if let Some(v) = self.vlan_id {
            key.vlan_id = v;
        }
        if let Some(v) = self.ip_proto {
            key.ip_proto = v;
        }
        if let Some(p) = self.ipv4_src {
            key.ipv4_src = p.addr;
        }
        if let Some(p) = self.ipv4_dst {
            key.ipv4_dst = p.addr;
        }
        if let Some(p) = self.ipv6_src {
            key.ipv6_src = p.addr;
        }
        if let Some(p) = self.ipv6_dst {
            key.ipv6_dst = p.addr;
        }
        if let Some(v) = self.src_port {
            key.src_port = v;
        }
        if let Some(v) = self.dst_port {
            key.dst_port = v;
        }
        key
    }

    /// Returns the mask comparing the given fields and wildcarding the
    /// rest.
    pub fn mask(&self) -> MatchMask {
        let mut mask = MatchMask::wildcard();
        if self.in_port.is_some() {
            mask = mask.in_port();
        }
        if self.eth_dst.is_some() {
            mask = mask.eth_dst();
        }
        if self.eth_src.is_some() {
            mask = mask.eth_src();
        }
        if self.eth_type.is_some() {
            mask = mask.eth_type();
        }
        if self.vlan_id.is_some() {
            mask = mask.vlan_id();
        }
        if self.ip_proto.is_some() {
            mask = mask.ip_proto();
        }
        if let Some(p) = self.ipv4_src {
            mask = mask.ipv4_src_prefix(p.len);
        }
        if let Some(p) = self.ipv4_dst {
            mask = mask.ipv4_dst_prefix(p.len);
        }
        if let Some(p) = self.ipv6_src {
            mask = mask.ipv6_src_prefix(p.len);
        }
        if let Some(p) = self.ipv6_dst {
            mask = mask.ipv6_dst_prefix(p.len);
        }
        if self.src_port.is_some() {
            mask = mask.src_port();
        }
        if self.dst_port.is_some() {
            mask = mask.dst_port();
        }
        mask
    }
}

/// A synthetic lookup.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    /// Seconds since the table was built.
    #[serde(deserialize_with = "duration_from_secs")]
    pub at: Duration,

    /// The packet header fields. Omitted fields are zero.
    pub key: MatchConfig,
}

/// Loads the flow table config from a TOML file.
///
/// # Example
///
/// ```sh
/// home$ ./udpgen -f flows.toml
/// ```
pub fn load_config() -> Result<FlowTableConfig> {
    let matches = clap_app!(flowtable =>
        (version: crate_version!())
        (@arg file: -f --file +required +takes_value "configuration file")
    )
    .get_matches();

    let path = matches
        .value_of("file")
        .ok_or_else(|| anyhow!("no configuration file given."))?;
    FlowTableConfig::from_file(path)
}
