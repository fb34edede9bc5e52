// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Document identifiers.
//!
//! Every document is keyed by 12 random bytes rendered as 24 lowercase hex
//! characters. Ids arriving from clients are checked against that format
//! and lowercased before any store access.

use crate::error::AppError;
use ring::rand::{SecureRandom, SystemRandom};

const ID_BYTES: usize = 12;
const ID_LEN: usize = ID_BYTES * 2;

/// Generate a fresh document id.
pub fn new_id() -> Result<String, AppError> {
    let mut bytes = [0u8; ID_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("system RNG unavailable")))?;
    Ok(hex::encode(bytes))
}

/// Whether `raw` is a well-formed document id.
pub fn is_valid_id(raw: &str) -> bool {
    raw.len() == ID_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Reject a malformed id with `BadRequest`, naming the entity in the message.
///
/// Returns the id in the lowercase form documents are keyed by.
pub fn ensure_valid_id(raw: &str, entity: &str) -> Result<String, AppError> {
    if is_valid_id(raw) {
        Ok(raw.to_ascii_lowercase())
    } else {
        Err(AppError::BadRequest(format!("Invalid {entity} ID format.")))
    }
}
