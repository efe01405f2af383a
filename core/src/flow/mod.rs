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

//! Flow rules and the values they match on.

mod expiry;
mod key;
mod mask;

pub use self::expiry::{expiry, Expiry};
pub use self::key::MatchKey;
pub use self::mask::MatchMask;

use std::fmt;
use std::time::Duration;

/// An installed match-action rule.
///
/// A flow matches every packet whose key equals the flow's key on the bits
/// the flow's mask compares. Among the matching flows of a table, the one
/// with the highest priority wins.
///
/// `A` is the action payload. The table stores it verbatim and replaces it
/// on modify, but never looks inside.
///
/// Times are `Duration`s since an epoch of the caller's choosing. The same
/// epoch must be used for every call on a table.
#[derive(Clone)]
pub struct Flow<A> {
    key: MatchKey,
    mask: MatchMask,
    priority: u16,
    actions: A,
    idle_timeout: Option<Duration>,
    hard_timeout: Option<Duration>,
    last_used: Duration,
    expire_at: Option<Duration>,
}

impl<A> Flow<A> {
    /// Creates a new flow without timeouts.
    pub fn new(key: MatchKey, mask: MatchMask, priority: u16, actions: A) -> Self {
        Flow {
            key,
            mask,
            priority,
            actions,
            idle_timeout: None,
            hard_timeout: None,
            last_used: Duration::default(),
            expire_at: None,
        }
    }

    /// Sets the idle timeout. A zero duration means no idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = non_zero(timeout);
        self
    }

    /// Sets the hard timeout. A zero duration means no hard timeout.
    pub fn with_hard_timeout(mut self, timeout: Duration) -> Self {
        self.hard_timeout = non_zero(timeout);
        self
    }

    /// Returns the match key as given at creation.
    #[inline]
    pub fn key(&self) -> &MatchKey {
        &self.key
    }

    /// Returns the key normalized through the flow's own mask.
    #[inline]
    pub fn masked_key(&self) -> MatchKey {
        self.mask.apply(&self.key)
    }

    #[inline]
    pub fn mask(&self) -> &MatchMask {
        &self.mask
    }

    #[inline]
    pub fn priority(&self) -> u16 {
        self.priority
    }

    #[inline]
    pub fn actions(&self) -> &A {
        &self.actions
    }

    /// Consumes the flow, returning its action payload.
    pub fn into_actions(self) -> A {
        self.actions
    }

    #[inline]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    #[inline]
    pub fn hard_timeout(&self) -> Option<Duration> {
        self.hard_timeout
    }

    /// Returns the idle timeout baseline: the install time plus the idle
    /// timeout until the first match, the time of the last match after.
    #[inline]
    pub fn last_used(&self) -> Duration {
        self.last_used
    }

    /// Returns when the hard timeout fires, if the flow has one and is
    /// installed.
    #[inline]
    pub fn expire_at(&self) -> Option<Duration> {
        self.expire_at
    }

    /// Returns which timeout, if any, has expired the flow at `now`.
    #[inline]
    pub fn expiry(&self, now: Duration) -> Option<Expiry> {
        expiry(self, now)
    }

    #[inline]
    pub fn is_expired(&self, now: Duration) -> bool {
        self.expiry(now).is_some()
    }

    /// Stamps the timeouts at installation.
    pub(crate) fn install(&mut self, now: Duration) {
        self.expire_at = self.hard_timeout.and_then(|t| now.checked_add(t));
        self.last_used = self
            .idle_timeout
            .and_then(|t| now.checked_add(t))
            .unwrap_or(now);
    }

    /// Records a successful match.
    #[inline]
    pub(crate) fn touch(&mut self, now: Duration) {
        self.last_used = now;
    }

    pub(crate) fn set_actions(&mut self, actions: A) {
        self.actions = actions;
    }
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    if timeout > Duration::default() {
        Some(timeout)
    } else {
        None
    }
}

impl<A: fmt::Debug> fmt::Debug for Flow<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("flow");
        d.field("key", &self.key)
            .field("mask", &self.mask)
            .field("priority", &self.priority)
            .field("actions", &self.actions);
        if let Some(idle) = &self.idle_timeout {
            d.field("idle_timeout", idle);
        }
        if let Some(hard) = &self.hard_timeout {
            d.field("hard_timeout", hard);
        }
        d.field("last_used", &self.last_used);
        if let Some(expire_at) = &self.expire_at {
            d.field("expire_at", expire_at);
        }
        d.finish()
    }
}
