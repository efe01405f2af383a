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

use super::MatchKey;
use crate::net::{EtherType, MacAddr, ProtocolNumber};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

const IPV4ADDR_BITS: u8 = 32;
const IPV6ADDR_BITS: u8 = 128;

/// Per-field wildcard mask, same shape as [`MatchKey`].
///
/// Each field of the mask is a bit mask over the matching key field. A
/// field of all ones is compared exactly, a field of zeros is wildcarded.
/// Address fields may also carry a prefix mask, matching a CIDR range.
///
/// Masks are built from [`MatchMask::wildcard`] by marking the fields a
/// flow cares about,
///
/// ```
/// let mask = MatchMask::wildcard()
///     .eth_type()
///     .ip_proto()
///     .ipv4_dst_prefix(24)
///     .dst_port();
/// ```
///
/// [`MatchKey`]: crate::MatchKey
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct MatchMask(MatchKey);

impl MatchMask {
    /// Returns the mask that compares every field exactly.
    pub const fn exact() -> Self {
        MatchMask(MatchKey::ones())
    }

    /// Returns the mask that ignores every field.
    pub const fn wildcard() -> Self {
        MatchMask(MatchKey::zeroed())
    }

    /// Creates a mask from raw per-field bit masks.
    pub fn from_bits(bits: MatchKey) -> Self {
        MatchMask(bits)
    }

    /// Returns the raw per-field bit masks.
    pub fn bits(&self) -> &MatchKey {
        &self.0
    }

    /// Compares the ingress port exactly.
    pub fn in_port(mut self) -> Self {
        self.0.in_port = u32::MAX;
        self
    }

    /// Compares the destination MAC address exactly.
    pub fn eth_dst(mut self) -> Self {
        self.0.eth_dst = MacAddr::BROADCAST;
        self
    }

    /// Compares the source MAC address exactly.
    pub fn eth_src(mut self) -> Self {
        self.0.eth_src = MacAddr::BROADCAST;
        self
    }

    /// Compares the Ethernet payload protocol exactly.
    pub fn eth_type(mut self) -> Self {
        self.0.eth_type = EtherType(u16::MAX);
        self
    }

    /// Compares the VLAN identifier exactly.
    pub fn vlan_id(mut self) -> Self {
        self.0.vlan_id = u16::MAX;
        self
    }

    /// Compares the IP protocol exactly.
    pub fn ip_proto(mut self) -> Self {
        self.0.ip_proto = ProtocolNumber(u8::MAX);
        self
    }

    /// Compares the leading `len` bits of the IPv4 source address.
    pub fn ipv4_src_prefix(mut self, len: u8) -> Self {
        self.0.ipv4_src = v4_netmask(len);
        self
    }

    /// Compares the leading `len` bits of the IPv4 destination address.
    pub fn ipv4_dst_prefix(mut self, len: u8) -> Self {
        self.0.ipv4_dst = v4_netmask(len);
        self
    }

    /// Compares the leading `len` bits of the IPv6 source address.
    pub fn ipv6_src_prefix(mut self, len: u8) -> Self {
        self.0.ipv6_src = v6_netmask(len);
        self
    }

    /// Compares the leading `len` bits of the IPv6 destination address.
    pub fn ipv6_dst_prefix(mut self, len: u8) -> Self {
        self.0.ipv6_dst = v6_netmask(len);
        self
    }

    /// Compares the transport source port exactly.
    pub fn src_port(mut self) -> Self {
        self.0.src_port = u16::MAX;
        self
    }

    /// Compares the transport destination port exactly.
    pub fn dst_port(mut self) -> Self {
        self.0.dst_port = u16::MAX;
        self
    }

    /// Normalizes a key by clearing every bit the mask wildcards.
    ///
    /// Two keys match under a mask iff their normalized forms are equal.
    #[inline]
    pub fn apply(&self, key: &MatchKey) -> MatchKey {
        key.and(&self.0)
    }

    /// Returns the intersection of the two masks, i.e. `other` normalized
    /// through `self`.
    #[inline]
    pub fn narrow(&self, other: &MatchMask) -> MatchMask {
        MatchMask(other.0.and(&self.0))
    }

    /// Returns whether `self` is at least as wildcarded as `other`.
    ///
    /// Holds when every bit `self` compares is also compared by `other`, so
    /// a flow installed under `other` is fully determined on the bits `self`
    /// looks at.
    #[inline]
    pub fn covers(&self, other: &MatchMask) -> bool {
        self.narrow(other) == *self
    }

    /// Returns whether every bit of every field is compared.
    pub fn is_exact(&self) -> bool {
        *self == MatchMask::exact()
    }

    /// Returns whether no field is compared.
    pub fn is_wildcard(&self) -> bool {
        *self == MatchMask::wildcard()
    }
}

impl fmt::Debug for MatchMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            write!(f, "mask(exact)")
        } else if self.is_wildcard() {
            write!(f, "mask(wildcard)")
        } else {
            write!(f, "mask{:?}", self.0)
        }
    }
}

/// Lengths above the address width are treated as the full width.
fn v4_netmask(len: u8) -> Ipv4Addr {
    match len.min(IPV4ADDR_BITS) {
        0 => Ipv4Addr::UNSPECIFIED,
        len => Ipv4Addr::from(u32::MAX << (IPV4ADDR_BITS - len)),
    }
}

fn v6_netmask(len: u8) -> Ipv6Addr {
    match len.min(IPV6ADDR_BITS) {
        0 => Ipv6Addr::UNSPECIFIED,
        len => Ipv6Addr::from(u128::MAX << (IPV6ADDR_BITS - len)),
    }
}
