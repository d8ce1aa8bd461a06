//! Request signing for the platform's private API.
//!
//! The platform verifies `w_rid = md5(canonical_query + mixin_key)`, where the
//! canonical query is the parameter set (including `wts`) sorted by key and
//! percent-encoded. The byte layout of the canonical query is part of the wire
//! contract, so the ordering and escaping here must not drift.

use super::types::SigningKeyPair;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field carrying the signing timestamp (unix seconds)
pub const TIMESTAMP_FIELD: &str = "wts";
/// Field carrying the hex digest
pub const SIGNATURE_FIELD: &str = "w_rid";

/// Published permutation over the 64 characters of `img_key + sub_key`.
pub const MIXIN_TABLE: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29, 28,
    14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25, 54, 21,
    56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];

/// Length of the mixed secret taken from the permuted key material
const MIXIN_KEY_LEN: usize = 32;

/// Characters the platform drops from values before signing
const STRIPPED_CHARS: &[char] = &['!', '\'', '(', ')', '*'];

pub type SignedParams = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    #[error("key material too short: {0} characters, need 64")]
    ShortKeyMaterial(usize),
}

/// Derive the mixed secret from the two keys.
pub fn mixin_key(keys: &SigningKeyPair) -> Result<String, SigningError> {
    let material: Vec<char> = keys.img_key().chars().chain(keys.sub_key().chars()).collect();
    if material.len() < MIXIN_TABLE.len() {
        return Err(SigningError::ShortKeyMaterial(material.len()));
    }
    Ok(MIXIN_TABLE
        .iter()
        .take(MIXIN_KEY_LEN)
        .map(|&i| material[i])
        .collect())
}

/// Sorted `key=value` pairs joined with `&`, keys and values percent-encoded.
///
/// `BTreeMap` iteration is the lexicographic byte order the platform uses.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign `params` using the current wall-clock time.
pub fn sign(params: BTreeMap<String, String>, keys: &SigningKeyPair) -> Result<SignedParams, SigningError> {
    sign_at(params, keys, chrono::Utc::now().timestamp())
}

/// Sign `params` with a pinned timestamp.
///
/// Any caller-supplied `wts`/`w_rid` is replaced.
pub fn sign_at(
    mut params: BTreeMap<String, String>,
    keys: &SigningKeyPair,
    timestamp: i64,
) -> Result<SignedParams, SigningError> {
    let mixin = mixin_key(keys)?;

    params.remove(SIGNATURE_FIELD);
    params.insert(TIMESTAMP_FIELD.to_string(), timestamp.to_string());
    for value in params.values_mut() {
        if value.contains(STRIPPED_CHARS) {
            value.retain(|c| !STRIPPED_CHARS.contains(&c));
        }
    }

    let query = canonical_query(&params);
    let digest = md5::compute(format!("{}{}", query, mixin).as_bytes());
    params.insert(SIGNATURE_FIELD.to_string(), format!("{:x}", digest));

    Ok(params)
}
