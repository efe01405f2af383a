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

//! Proptest strategies.
//!
//! The `udp_*` strategies draw from deliberately small value domains so
//! that generated flows and queries collide often enough to exercise
//! priority resolution and shared buckets.

use crate::flow::{Flow, MatchKey, MatchMask};
use crate::net::{EtherType, MacAddr, ProtocolNumber, ProtocolNumbers};
use proptest::arbitrary::any;
use proptest::prop_oneof;
use proptest::sample::select;
use proptest::strategy::{Just, Strategy};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Returns a strategy generating random MAC addresses.
pub fn mac_addr() -> impl Strategy<Value = MacAddr> {
    any::<[u8; 6]>().prop_map(MacAddr::from)
}

/// Returns a strategy generating keys with every field random.
pub fn match_key() -> impl Strategy<Value = MatchKey> {
    let l2 = (
        any::<u32>(),
        mac_addr(),
        mac_addr(),
        any::<u16>(),
        any::<u16>(),
        any::<u8>(),
    );
    let l3 = (
        any::<Ipv4Addr>(),
        any::<Ipv4Addr>(),
        any::<Ipv6Addr>(),
        any::<Ipv6Addr>(),
        any::<u16>(),
        any::<u16>(),
    );

    (l2, l3).prop_map(
        |(
            (in_port, eth_dst, eth_src, eth_type, vlan_id, ip_proto),
            (ipv4_src, ipv4_dst, ipv6_src, ipv6_dst, src_port, dst_port),
        )| MatchKey {
            in_port,
            eth_dst,
            eth_src,
            eth_type: EtherType::new(eth_type),
            vlan_id,
            ip_proto: ProtocolNumber::new(ip_proto),
            ipv4_src,
            ipv4_dst,
            ipv6_src,
            ipv6_dst,
            src_port,
            dst_port,
        },
    )
}

/// Returns a strategy generating IPv4 TCP or UDP keys over a handful of
/// addresses and ports.
pub fn udp_key() -> impl Strategy<Value = MatchKey> {
    (
        select(vec![ProtocolNumbers::Udp, ProtocolNumbers::Tcp]),
        0..4u8,
        select(vec![5000u16, 5001]),
        select(vec![80u16, 443]),
    )
        .prop_map(|(proto, host, src_port, dst_port)| MatchKey {
            ip_proto: proto,
            ..MatchKey::udp_v4(Ipv4Addr::new(10, 0, 0, host), src_port, dst_port)
        })
}

/// Returns a strategy picking among the masks flow rules commonly use.
pub fn udp_mask() -> impl Strategy<Value = MatchMask> {
    let l4 = MatchMask::wildcard().eth_type().ip_proto();
    prop_oneof![
        Just(MatchMask::exact()),
        Just(l4.ipv4_dst_prefix(32).src_port().dst_port()),
        Just(l4.ipv4_dst_prefix(24).dst_port()),
        Just(l4.dst_port()),
        Just(MatchMask::wildcard().eth_type()),
        Just(MatchMask::wildcard()),
    ]
}

/// Returns a strategy generating flows from `udp_key` and `udp_mask`,
/// with priorities below `max_priority`.
pub fn udp_flow(max_priority: u16) -> impl Strategy<Value = Flow<u32>> {
    (udp_key(), udp_mask(), 0..max_priority, any::<u32>()).prop_map(
        |(key, mask, priority, actions)| Flow::new(key, mask, priority, actions),
    )
}
