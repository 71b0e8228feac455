//! Shared payload-parsing helpers. Amounts travel as unsigned decimal
//! strings (§3 Wallet); every reducer goes through `parse_amount` rather than
//! accepting a JSON number so a float-valued `amount` is always rejected.

use claw_core::error::ClawError;
use claw_core::types::Balance;
use serde_json::Value;

pub fn parse_amount(value: &Value, field: &str) -> Result<Balance, ClawError> {
    let s = value
        .as_str()
        .ok_or_else(|| ClawError::SchemaViolation(format!("`{field}` must be a decimal string")))?;
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ClawError::SchemaViolation(format!(
            "`{field}` must be an unsigned decimal string, got {s:?}"
        )));
    }
    s.parse::<Balance>()
        .map_err(|_| ClawError::SchemaViolation(format!("`{field}` does not fit in a balance")))
}

pub fn get_field<'a>(payload: &'a Value, field: &str) -> Result<&'a Value, ClawError> {
    payload
        .get(field)
        .ok_or_else(|| ClawError::SchemaViolation(format!("missing field `{field}`")))
}

pub fn get_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, ClawError> {
    get_field(payload, field)?
        .as_str()
        .ok_or_else(|| ClawError::SchemaViolation(format!("`{field}` must be a string")))
}

pub fn get_str_opt<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(|v| v.as_str())
}
