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

use std::fmt;
use std::ops::BitAnd;
use std::str::FromStr;
use thiserror::Error;

/// Ethernet MAC address.
///
/// As a match field, the address doubles as its own bit mask. `BROADCAST`
/// is the exact mask and `UNSPECIFIED` the wildcard.
#[derive(Default, Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// A MAC address representing an unspecified address: 00:00:00:00:00:00.
    pub const UNSPECIFIED: Self = MacAddr([0; 6]);

    /// The broadcast address ff:ff:ff:ff:ff:ff.
    pub const BROADCAST: Self = MacAddr([0xff; 6]);

    /// Creates a MAC address from 6 octets.
    #[allow(clippy::many_single_char_names)]
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        MacAddr([a, b, c, d, e, f])
    }

    /// Returns the six bytes the MAC address consists of.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Returns whether the multicast bit of the first octet is set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl BitAnd for MacAddr {
    type Output = MacAddr;

    fn bitand(self, rhs: MacAddr) -> MacAddr {
        let mut octets = [0; 6];
        for (i, o) in octets.iter_mut().enumerate() {
            *o = self.0[i] & rhs.0[i];
        }
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> MacAddr {
        MacAddr(octets)
    }
}

/// Error returned when parsing a malformed MAC address.
#[derive(Debug, Error)]
#[error("Failed to parse '{0}' as MAC address.")]
pub struct MacParseError(String);

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split(|c| c == ':' || c == '-').collect::<Vec<_>>();
        if parts.len() != 6 {
            return Err(MacParseError(s.to_owned()));
        }

        let mut octets = [0; 6];
        for (o, part) in octets.iter_mut().zip(parts) {
            *o = u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_owned()))?;
        }
        Ok(octets.into())
    }
}
