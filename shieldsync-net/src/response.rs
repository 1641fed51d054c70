//! Decoding of raw JSON replies into typed values.
//!
//! Services are loose about numeric encodings, so heights are accepted as
//! integers, integral floats, or decimal strings. Anything negative,
//! fractional or non-finite is rejected.

use crate::error::{NetError, NetResult};
use serde_json::Value;
use shieldsync_types::{ChainMetadata, CompactBlock, RawTransaction};

pub fn parse_height(endpoint: &str, value: Option<&Value>, field: &str) -> NetResult<u64> {
    let invalid = |what: String| NetError::invalid_response(endpoint, format!("{field}: {what}"));

    match value {
        Some(Value::Number(n)) => {
            if let Some(h) = n.as_u64() {
                return Ok(h);
            }
            match n.as_f64() {
                // 2^64 rounds to `u64::MAX as f64`, so the bound is exclusive.
                Some(f)
                    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 =>
                {
                    Ok(f as u64)
                }
                _ => Err(invalid(format!("not a non-negative height: {n}"))),
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(format!("not a non-negative height: {s:?}"))),
        Some(other) => Err(invalid(format!("unexpected type: {other}"))),
        None => Err(invalid("missing".to_string())),
    }
}

fn string_field(endpoint: &str, value: &Value, field: &str) -> NetResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            NetError::invalid_response(endpoint, format!("{field}: missing or not a string"))
        })
}

pub fn parse_metadata(endpoint: &str, value: &Value) -> NetResult<ChainMetadata> {
    Ok(ChainMetadata {
        chain_name: string_field(endpoint, value, "chainName")?,
        block_height: parse_height(endpoint, value.get("blockHeight"), "blockHeight")?,
        vendor: value
            .get("vendor")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

pub fn parse_block(endpoint: &str, value: &Value) -> NetResult<CompactBlock> {
    Ok(CompactBlock {
        height: parse_height(endpoint, value.get("height"), "height")?,
        hash: string_field(endpoint, value, "hash")?,
    })
}

/// Accepts either a bare array or `{ "blocks": [...] }`.
pub fn parse_blocks(endpoint: &str, value: &Value) -> NetResult<Vec<CompactBlock>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("blocks") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(NetError::invalid_response(endpoint, "blocks: missing array"));
            }
        },
        other => {
            return Err(NetError::invalid_response(
                endpoint,
                format!("blocks: unexpected type: {other}"),
            ));
        }
    };

    items.iter().map(|item| parse_block(endpoint, item)).collect()
}

pub fn parse_raw_transaction(
    endpoint: &str,
    txid: &str,
    value: &Value,
) -> NetResult<RawTransaction> {
    Ok(RawTransaction {
        txid: txid.to_string(),
        data: string_field(endpoint, value, "data")?,
        height: parse_height(endpoint, value.get("height"), "height")?,
    })
}
