/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::http_retry::send_with_retry;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;

pub const ACTIVITY_CONTENT_TYPE: &str = "application/activity+json";

/// Moves one serialized activity to one inbox. Implementations report failure
/// through the result; retry scheduling belongs to the queue.
#[async_trait]
pub trait ActivityTransport: Send + Sync {
    async fn deliver(&self, inbox_url: &str, body: &[u8]) -> Result<()>;
}

#[derive(Debug)]
pub struct PermanentFailure {
    pub status: u16,
}

impl std::fmt::Display for PermanentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inbox rejected delivery with status {}", self.status)
    }
}

impl std::error::Error for PermanentFailure {}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    attempts: u32,
}

impl HttpTransport {
    pub fn new(timeout: Duration, attempts: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client, attempts })
    }
}

#[async_trait]
impl ActivityTransport for HttpTransport {
    async fn deliver(&self, inbox_url: &str, body: &[u8]) -> Result<()> {
        let body = body.to_vec();
        let resp = send_with_retry(
            || {
                self.client
                    .post(inbox_url)
                    .header(CONTENT_TYPE, ACTIVITY_CONTENT_TYPE)
                    .header(ACCEPT, ACTIVITY_CONTENT_TYPE)
                    .header(USER_AGENT, concat!("fedigate/", env!("CARGO_PKG_VERSION")))
                    .body(body.clone())
            },
            self.attempts,
        )
        .await
        .with_context(|| format!("post to inbox: {inbox_url}"))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        // Gone or not found will not get better by retrying.
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(anyhow::Error::new(PermanentFailure {
                status: status.as_u16(),
            }));
        }
        Err(anyhow!("inbox {inbox_url} answered {status}"))
    }
}

pub fn is_permanent(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|e| e.downcast_ref::<PermanentFailure>().is_some())
}
