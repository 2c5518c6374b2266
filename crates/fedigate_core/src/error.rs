/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use thiserror::Error;

pub type GateResult<T> = std::result::Result<T, GateError>;

/// Caller-facing failures of the policy, approval and poll operations.
///
/// Everything except `Internal` is an expected outcome the caller can act on.
/// `Internal` wraps storage or queue failures with the entity context attached
/// by the store that produced them.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Invalid,
    Internal,
}

impl GateError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Status code a transport layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Forbidden => 403,
            ErrorKind::Invalid => 422,
            ErrorKind::Internal => 500,
        }
    }
}

impl From<tokio::task::JoinError> for GateError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::Error::new(e).context("blocking task failed"))
    }
}

impl From<rusqlite::Error> for GateError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn internal_keeps_context_chain() {
        let res: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let err: GateError = res
            .context("store poll vote poll=01HX")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let text = err.to_string();
        assert!(text.contains("poll=01HX"), "{text}");
        assert!(text.contains("disk full"), "{text}");
    }

    #[test]
    fn status_codes() {
        assert_eq!(GateError::not_found("x").http_status(), 404);
        assert_eq!(GateError::conflict("x").http_status(), 409);
        assert_eq!(GateError::forbidden("x").http_status(), 403);
        assert_eq!(GateError::invalid("x").http_status(), 422);
    }
}
