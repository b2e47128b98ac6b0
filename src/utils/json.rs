use serde::de::DeserializeOwned;
use serde_json::Value;

/// A field of a partial-update body.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    /// Changeset form: `None` leaves the column alone, `Some(None)` clears it.
    pub fn into_nullable(self) -> Option<Option<T>> {
        match self {
            Patch::Omitted => None,
            Patch::Null => Some(None),
            Patch::Value(value) => Some(Some(value)),
        }
    }

    /// For non-nullable columns: `null` is rejected.
    pub fn into_required(self, field: &str) -> Result<Option<T>, String> {
        match self {
            Patch::Omitted => Ok(None),
            Patch::Null => Err(format!("{field} cannot be null")),
            Patch::Value(value) => Ok(Some(value)),
        }
    }
}

pub fn patch_field<T: DeserializeOwned>(body: &Value, field: &str) -> Result<Patch<T>, String> {
    match body.get(field) {
        None => Ok(Patch::Omitted),
        Some(Value::Null) => Ok(Patch::Null),
        Some(value) => serde_json::from_value(value.clone())
            .map(Patch::Value)
            .map_err(|err| format!("invalid value for {field}: {err}")),
    }
}

/// Trimmed string field; blank strings count as `null`.
pub fn patch_text(body: &Value, field: &str) -> Result<Patch<String>, String> {
    match body.get(field) {
        None => Ok(Patch::Omitted),
        Some(Value::Null) => Ok(Patch::Null),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(Patch::Null)
            } else {
                Ok(Patch::Value(trimmed.to_owned()))
            }
        }
        Some(other) => Err(format!("{field}: expected string or null, got {other}")),
    }
}

pub fn ensure_object(body: &Value) -> Result<(), String> {
    if body.is_object() {
        Ok(())
    } else {
        Err("request body must be a JSON object".to_string())
    }
}
