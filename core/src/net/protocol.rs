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

/// Assigned internet protocol number.
///
/// See [IANA] for the full list. [`ProtocolNumbers`] names the ones flow
/// rules commonly match on.
///
/// [IANA]: https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml
/// [`ProtocolNumbers`]: crate::net::ProtocolNumbers
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ProtocolNumber(pub u8);

impl ProtocolNumber {
    /// Creates a new protocol number.
    pub fn new(value: u8) -> Self {
        ProtocolNumber(value)
    }
}

impl BitAnd for ProtocolNumber {
    type Output = ProtocolNumber;

    fn bitand(self, rhs: ProtocolNumber) -> ProtocolNumber {
        ProtocolNumber(self.0 & rhs.0)
    }
}

/// Supported protocol numbers.
#[allow(non_snake_case)]
#[allow(non_upper_case_globals)]
pub mod ProtocolNumbers {
    use super::ProtocolNumber;

    /// Transmission Control Protocol.
    pub const Tcp: ProtocolNumber = ProtocolNumber(0x06);

    /// User Datagram Protocol.
    pub const Udp: ProtocolNumber = ProtocolNumber(0x11);

    /// Internet Control Message Protocol for IPv4.
    pub const Icmpv4: ProtocolNumber = ProtocolNumber(0x01);

    /// Internet Control Message Protocol for IPv6.
    pub const Icmpv6: ProtocolNumber = ProtocolNumber(0x3A);
}

impl fmt::Display for ProtocolNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProtocolNumbers::Tcp => write!(f, "TCP"),
            ProtocolNumbers::Udp => write!(f, "UDP"),
            ProtocolNumbers::Icmpv4 => write!(f, "ICMPv4"),
            ProtocolNumbers::Icmpv6 => write!(f, "ICMPv6"),
            _ => write!(f, "0x{:02x}", self.0),
        }
    }
}
