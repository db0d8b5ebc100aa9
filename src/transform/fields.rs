use super::TransformError;
use crate::domain::{Event, FieldValue};

/// Parse `--add_field` entries of the form `key=val`.
pub fn parse_add_fields(entries: &[String]) -> Result<Vec<(String, String)>, TransformError> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(TransformError::InvalidAddField(entry.clone())),
        })
        .collect()
}

pub fn add_fields(event: &mut Event, fields: &[(String, String)]) {
    for (key, value) in fields {
        event.insert(key.clone(), FieldValue::Str(value.clone()));
    }
}

pub fn drop_fields(event: &mut Event, names: &[String]) {
    for name in names {
        event.remove(name);
    }
}
