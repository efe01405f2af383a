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

use anyhow::Result;
use colored::*;
use flowtable::config::{load_config, ProbeConfig};
use flowtable::{Expiry, FlowTable};
use tracing::{debug, info, Level};
use tracing_subscriber::fmt;

#[derive(Default)]
struct Tally {
    hits: usize,
    misses: usize,
}

fn probe(table: &mut FlowTable<String>, probe: &ProbeConfig, tally: &mut Tally) {
    let key = probe.key.key();
    match table.lookup(&key, probe.at) {
        Some(flow) => {
            tally.hits += 1;
            let hit_fmt = format!(
                "{:?} hit  {:?} -> {} (priority {})",
                probe.at,
                key,
                flow.actions(),
                flow.priority()
            )
            .green();
            println!("{}", hit_fmt);
        }
        None => {
            tally.misses += 1;
            let miss_fmt = format!("{:?} miss {:?}", probe.at, key).red();
            println!("{}", miss_fmt);
        }
    }
}

fn dump(table: &FlowTable<String>) {
    for flow in table.iter() {
        let flow_fmt = format!("{:?}", flow).bright_blue();
        println!("{}", flow_fmt);
    }
}

fn main() -> Result<()> {
    let subscriber = fmt::Subscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config()?;
    debug!(?config);

    let mut table = config.build();
    dump(&table);

    let mut probes = config.probes.clone();
    probes.sort_by_key(|p| p.at);

    let mut tally = Tally::default();
    for p in probes.iter() {
        probe(&mut table, p, &mut tally);
    }

    let end = probes.last().map(|p| p.at).unwrap_or_default();
    let expired = table.expire(end);
    for flow in expired.iter() {
        let reason = match flow.expiry(end) {
            Some(Expiry::Hard) => "hard",
            Some(Expiry::Idle) => "idle",
            None => "unknown",
        };
        let expired_fmt = format!("expired ({}) {:?}", reason, flow).yellow();
        println!("{}", expired_fmt);
    }

    info!(
        table = table.id(),
        hits = tally.hits,
        misses = tally.misses,
        expired = expired.len(),
        remaining = table.len(),
        "replay finished."
    );

    Ok(())
}
