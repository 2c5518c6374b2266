/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use fedigate_core::config::{default_config_path, CoreConfig};
use fedigate_core::runtime::Core;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

fn parse_config_path() -> Result<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return Ok(PathBuf::from(path));
            }
            return Err(anyhow::anyhow!("--config requires a path"));
        }
    }
    default_config_path()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg_path = parse_config_path()?;
    let cfg = CoreConfig::load(&cfg_path)?;
    let core = Core::start(cfg).await?;
    info!("config: {}", cfg_path.display());

    let mut events = core.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stats_tick = tokio::time::interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown requested");
                break;
            }
            ev = events.recv() => {
                if let Ok(ev) = ev {
                    info!("event {} detail={:?} id={:?}", ev.kind, ev.detail, ev.entity_id);
                }
            }
            _ = stats_tick.tick() => {
                match core.queue.stats().await {
                    Ok(s) => info!("delivery queue pending={} delivered={} dead={}", s.pending, s.delivered, s.dead),
                    Err(e) => tracing::warn!("queue stats: {e:#}"),
                }
            }
        }
    }

    core.shutdown();
    Ok(())
}
