/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{anyhow, Result};
use rand::{thread_rng, Rng};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Sends with a short in-process retry for transient failures (connect errors,
/// 429, 5xx). Longer outages are handled by the delivery queue's own backoff.
pub async fn send_with_retry<F>(mut build: F, attempts: u32) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = attempts.clamp(1, 5);
    let mut backoff = Duration::from_millis(200);
    let mut last_err = None;
    for attempt in 0..max_attempts {
        let last = attempt + 1 >= max_attempts;
        match build().send().await {
            Ok(resp) => {
                if should_retry_status(resp.status()) && !last {
                    sleep_with_jitter(backoff).await;
                    backoff = next_backoff(backoff);
                    continue;
                }
                return Ok(resp);
            }
            Err(e) => {
                if last {
                    return Err(e.into());
                }
                last_err = Some(e);
                sleep_with_jitter(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
    Err(last_err
        .map(Into::into)
        .unwrap_or_else(|| anyhow!("no attempt made")))
}

pub fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(Duration::from_secs(5))
}

async fn sleep_with_jitter(base: Duration) {
    let jitter_ms: u64 = thread_rng().gen_range(0..=200);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}
