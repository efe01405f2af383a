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

//! A multi-table packet classifier core. Flows match packet header fields
//! under a bit mask and carry an opaque action payload. A [`FlowTable`]
//! resolves a packet key to the highest priority matching flow, expires
//! flows lazily against caller supplied time, and supports OpenFlow style
//! strict and non-strict modify and delete.
//!
//! Time is a [`Duration`] since an epoch the caller picks. The table never
//! reads a clock.
//!
//! [`FlowTable`]: crate::FlowTable
//! [`Duration`]: std::time::Duration

pub mod config;
pub mod flow;
pub mod net;
mod table;
#[cfg(any(test, feature = "testils"))]
pub mod testils;

pub use self::flow::{Expiry, Flow, MatchKey, MatchMask};
pub use self::table::{FlowNotFoundError, FlowTable, MissPolicy};

/// A type alias of `std::result::Result` for convenience.
pub type Result<T> = anyhow::Result<T>;
