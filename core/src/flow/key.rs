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

use crate::net::{EtherType, EtherTypes, MacAddr, ProtocolNumber, ProtocolNumbers};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// The header fields a flow matches on.
///
/// The layout is fixed so packet producers and the table agree on it
/// field by field. The table never interprets the values; it only
/// compares and masks them. Fields a packet does not carry stay zero.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct MatchKey {
    /// Ingress port number.
    pub in_port: u32,
    /// Destination MAC address.
    pub eth_dst: MacAddr,
    /// Source MAC address.
    pub eth_src: MacAddr,
    /// Ethernet payload protocol.
    pub eth_type: EtherType,
    /// 802.1Q VLAN identifier.
    pub vlan_id: u16,
    /// IPv4 protocol or IPv6 next header.
    pub ip_proto: ProtocolNumber,
    /// IPv4 source address.
    pub ipv4_src: Ipv4Addr,
    /// IPv4 destination address.
    pub ipv4_dst: Ipv4Addr,
    /// IPv6 source address.
    pub ipv6_src: Ipv6Addr,
    /// IPv6 destination address.
    pub ipv6_dst: Ipv6Addr,
    /// TCP or UDP source port.
    pub src_port: u16,
    /// TCP or UDP destination port.
    pub dst_port: u16,
}

impl MatchKey {
    /// Returns the key with every field set to zero.
    pub const fn zeroed() -> Self {
        MatchKey {
            in_port: 0,
            eth_dst: MacAddr::UNSPECIFIED,
            eth_src: MacAddr::UNSPECIFIED,
            eth_type: EtherType(0),
            vlan_id: 0,
            ip_proto: ProtocolNumber(0),
            ipv4_src: Ipv4Addr::UNSPECIFIED,
            ipv4_dst: Ipv4Addr::UNSPECIFIED,
            ipv6_src: Ipv6Addr::UNSPECIFIED,
            ipv6_dst: Ipv6Addr::UNSPECIFIED,
            src_port: 0,
            dst_port: 0,
        }
    }

    /// Returns the key with every bit of every field set.
    pub const fn ones() -> Self {
        MatchKey {
            in_port: u32::MAX,
            eth_dst: MacAddr::BROADCAST,
            eth_src: MacAddr::BROADCAST,
            eth_type: EtherType(u16::MAX),
            vlan_id: u16::MAX,
            ip_proto: ProtocolNumber(u8::MAX),
            ipv4_src: Ipv4Addr::BROADCAST,
            ipv4_dst: Ipv4Addr::BROADCAST,
            ipv6_src: Ipv6Addr::new(
                0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff,
            ),
            ipv6_dst: Ipv6Addr::new(
                0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff,
            ),
            src_port: u16::MAX,
            dst_port: u16::MAX,
        }
    }

    /// Creates the key of an IPv4 UDP datagram, as a raw UDP traffic
    /// generator emits it.
    pub fn udp_v4(ipv4_dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        MatchKey {
            eth_type: EtherTypes::Ipv4,
            ip_proto: ProtocolNumbers::Udp,
            ipv4_dst,
            src_port,
            dst_port,
            ..MatchKey::zeroed()
        }
    }

    /// Creates the key of an IPv4 TCP segment.
    pub fn tcp_v4(ipv4_src: Ipv4Addr, ipv4_dst: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        MatchKey {
            eth_type: EtherTypes::Ipv4,
            ip_proto: ProtocolNumbers::Tcp,
            ipv4_src,
            ipv4_dst,
            src_port,
            dst_port,
            ..MatchKey::zeroed()
        }
    }

    /// Field-wise bitwise AND of two keys.
    pub(crate) fn and(&self, other: &MatchKey) -> MatchKey {
        MatchKey {
            in_port: self.in_port & other.in_port,
            eth_dst: self.eth_dst & other.eth_dst,
            eth_src: self.eth_src & other.eth_src,
            eth_type: self.eth_type & other.eth_type,
            vlan_id: self.vlan_id & other.vlan_id,
            ip_proto: self.ip_proto & other.ip_proto,
            ipv4_src: Ipv4Addr::from(u32::from(self.ipv4_src) & u32::from(other.ipv4_src)),
            ipv4_dst: Ipv4Addr::from(u32::from(self.ipv4_dst) & u32::from(other.ipv4_dst)),
            ipv6_src: Ipv6Addr::from(u128::from(self.ipv6_src) & u128::from(other.ipv6_src)),
            ipv6_dst: Ipv6Addr::from(u128::from(self.ipv6_dst) & u128::from(other.ipv6_dst)),
            src_port: self.src_port & other.src_port,
            dst_port: self.dst_port & other.dst_port,
        }
    }
}

impl Default for MatchKey {
    fn default() -> MatchKey {
        MatchKey::zeroed()
    }
}

impl fmt::Debug for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("key")
            .field("in_port", &self.in_port)
            .field("eth_dst", &format!("{}", self.eth_dst))
            .field("eth_src", &format!("{}", self.eth_src))
            .field("eth_type", &format!("{}", self.eth_type))
            .field("vlan_id", &self.vlan_id)
            .field("ip_proto", &format!("{}", self.ip_proto))
            .field("ipv4_src", &self.ipv4_src)
            .field("ipv4_dst", &self.ipv4_dst)
            .field("ipv6_src", &self.ipv6_src)
            .field("ipv6_dst", &self.ipv6_dst)
            .field("src_port", &self.src_port)
            .field("dst_port", &self.dst_port)
            .finish()
    }
}
