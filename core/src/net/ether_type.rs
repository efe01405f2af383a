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

/// The protocol identifier of the Ethernet frame payload.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct EtherType(pub u16);

impl EtherType {
    /// Creates an Ethernet payload protocol identifier.
    pub fn new(value: u16) -> Self {
        EtherType(value)
    }
}

impl BitAnd for EtherType {
    type Output = EtherType;

    fn bitand(self, rhs: EtherType) -> EtherType {
        EtherType(self.0 & rhs.0)
    }
}

/// Supported Ethernet payload protocol types.
#[allow(non_snake_case)]
#[allow(non_upper_case_globals)]
pub mod EtherTypes {
    use super::EtherType;

    /// Address resolution protocol.
    pub const Arp: EtherType = EtherType(0x0806);
    /// Internet Protocol version 4.
    pub const Ipv4: EtherType = EtherType(0x0800);
    /// Internet Protocol version 6.
    pub const Ipv6: EtherType = EtherType(0x86DD);
    /// IEEE 802.1Q VLAN tag.
    pub const Dot1q: EtherType = EtherType(0x8100);
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EtherTypes::Arp => write!(f, "ARP"),
            EtherTypes::Ipv4 => write!(f, "IPv4"),
            EtherTypes::Ipv6 => write!(f, "IPv6"),
            EtherTypes::Dot1q => write!(f, "802.1Q"),
            _ => write!(f, "0x{:04x}", self.0),
        }
    }
}
