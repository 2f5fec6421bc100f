use crate::error::{ActionError, ActionResult};
use serde_json::Value;

pub fn required_str(params: &Value, key: &str) -> ActionResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::field(key, format!("missing {}", key)))
}

/// `Ok(None)` for absent, null or blank strings.
pub fn opt_str(params: &Value, key: &str) -> ActionResult<Option<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| ActionError::field(key, format!("{} must be string or null", key)))?
                .trim()
                .to_string();
            Ok(if s.is_empty() { None } else { Some(s) })
        }
    }
}

pub fn required_i64(params: &Value, key: &str) -> ActionResult<i64> {
    match params.get(key) {
        None | Some(Value::Null) => Err(ActionError::field(key, format!("missing {}", key))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| ActionError::field(key, format!("{} must be integer", key))),
    }
}

pub fn opt_i64(params: &Value, key: &str) -> ActionResult<Option<i64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| ActionError::field(key, format!("{} must be integer or null", key))),
    }
}

pub fn opt_f64(params: &Value, key: &str) -> ActionResult<Option<f64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| ActionError::field(key, format!("{} must be number or null", key))),
    }
}

/// Distinct non-blank ids in input order; `None` when the key is absent.
pub fn opt_id_list(params: &Value, key: &str) -> ActionResult<Option<Vec<String>>> {
    let Some(raw) = params.get(key) else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(Some(Vec::new()));
    }
    let arr = raw
        .as_array()
        .ok_or_else(|| ActionError::field(key, format!("{} must be array of strings", key)))?;
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .ok_or_else(|| ActionError::field(key, format!("{} must be array of strings", key)))?
            .trim()
            .to_string();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    Ok(Some(out))
}
