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

use super::Flow;
use std::time::Duration;

/// The timeout that expired a flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Expiry {
    /// The flow outlived its hard timeout, counted from installation.
    Hard,
    /// The flow went unmatched for longer than its idle timeout.
    Idle,
}

/// Decides whether a flow has expired at `now`.
///
/// The hard timeout is checked first. A flow whose hard timeout has not
/// yet elapsed can still expire through its idle timeout. Timestamps that
/// overflow `Duration` never expire.
pub fn expiry<A>(flow: &Flow<A>, now: Duration) -> Option<Expiry> {
    if flow.hard_timeout.is_some() {
        if let Some(expire_at) = flow.expire_at {
            if now >= expire_at {
                return Some(Expiry::Hard);
            }
        }
    }

    if let Some(idle) = flow.idle_timeout {
        let idle_at = flow.last_used.checked_add(idle);
        if idle_at.map_or(false, |at| now >= at) {
            return Some(Expiry::Idle);
        }
    }

    None
}
