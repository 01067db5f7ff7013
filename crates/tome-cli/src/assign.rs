//! Parsing of `--set key=value` arguments.

use tome_core::field::{FieldValue, validate_field_name};

/// Parse `key=value`. The value is a bool if it reads `true`/`false`, a
/// number if it parses as a finite float, and text otherwise.
///
/// Wrap a value in double quotes to force text (`--set code="42"`).
pub fn parse_assignment(raw: &str) -> Result<(String, FieldValue), String> {
  let (key, value) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
  let key = key.trim();
  validate_field_name(key).map_err(|e| e.to_string())?;
  Ok((key.to_owned(), parse_value(value)))
}

pub fn parse_value(raw: &str) -> FieldValue {
  if let Some(text) = raw
    .strip_prefix('"')
    .and_then(|s| s.strip_suffix('"'))
  {
    return FieldValue::Text(text.to_owned());
  }
  match raw {
    "true" => return FieldValue::Bool(true),
    "false" => return FieldValue::Bool(false),
    _ => {}
  }
  match raw.parse::<f64>() {
    Ok(n) if n.is_finite() => FieldValue::Number(n),
    _ => FieldValue::Text(raw.to_owned()),
  }
}
