//! Legacy and current wire shapes of a conversion configuration.
//!
//! Two shapes exist on the wire:
//!
//! | Shape     | GPU record   | Key aliases                          |
//! |-----------|--------------|--------------------------------------|
//! | `legacy`  | `gpu_config` | `devices`, `workers`, `memory_limit` |
//! | `current` | `gpu`        | none                                 |
//!
//! OCR configurations carry no GPU record, so the two shapes coincide for
//! them; an OCR object is classified as `current`.
//!
//! [`detect_shape`] is the only place that inspects key presence. Everything
//! else branches on the [`ConfigShape`] it returns.

use super::ConfigModel;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Which wire shape a configuration object uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigShape {
    /// `gpu_config` key, nested GPU record with older key names.
    #[serde(alias = "v1")]
    Legacy,
    /// `gpu` key. (default)
    #[default]
    #[serde(alias = "v2")]
    Current,
    /// Neither of the above, or a shape name this client does not know.
    #[serde(other)]
    Unrecognized,
}

impl fmt::Display for ConfigShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Current => write!(f, "current"),
            Self::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// Classify a configuration object. Pure and total.
pub fn detect_shape(value: &Value) -> ConfigShape {
    let Some(obj) = value.as_object() else {
        return ConfigShape::Unrecognized;
    };

    let mode = match obj.get("conversion_mode") {
        None => None,
        Some(Value::String(m)) if m == "marker" || m == "ocr" => Some(m.as_str()),
        Some(_) => return ConfigShape::Unrecognized,
    };

    match (obj.get("gpu_config"), obj.get("gpu")) {
        (Some(Value::Object(_)), None) => ConfigShape::Legacy,
        (None, Some(Value::Object(_))) if mode.is_some() => ConfigShape::Current,
        (None, None) if mode.is_some() => ConfigShape::Current,
        _ => ConfigShape::Unrecognized,
    }
}

/// Parse a configuration object of either shape.
///
/// Fields with no value in the object take the current defaults; keys that
/// belong to the other mode are ignored. Returns the parsed model together
/// with the shape it was read from.
pub fn from_wire(value: &Value) -> Result<(ConfigModel, ConfigShape), ConfigError> {
    let shape = detect_shape(value);
    let current = match shape {
        ConfigShape::Legacy => legacy_to_current(value)?,
        ConfigShape::Current => value.clone(),
        ConfigShape::Unrecognized => return Err(ConfigError::UnrecognizedShape),
    };
    let model: ConfigModel =
        serde_json::from_value(current).map_err(|e| ConfigError::Malformed(e.to_string()))?;
    Ok((model, shape))
}

/// Serialise `config` in the requested shape.
///
/// `Unrecognized` is not a target shape; it is treated as `Current`.
pub fn to_wire(config: &ConfigModel, shape: ConfigShape) -> Value {
    let mut value = match serde_json::to_value(config) {
        Ok(v) => v,
        // Only plain data types are involved; serialisation cannot fail.
        Err(_) => Value::Null,
    };
    if shape == ConfigShape::Legacy {
        if let Some(obj) = value.as_object_mut() {
            if let Some(gpu) = obj.remove("gpu") {
                obj.insert("gpu_config".into(), gpu);
            }
        }
    }
    value
}

/// Rewrite a legacy object into the current shape.
///
/// `gpu_config` becomes `gpu`, the older `devices`/`workers` names become
/// `num_devices`/`num_workers`, and `memory_limit` (no counterpart) is
/// dropped. A missing `conversion_mode` means marker: the earliest legacy
/// objects predate OCR mode.
pub fn legacy_to_current(value: &Value) -> Result<Value, ConfigError> {
    let obj = value.as_object().ok_or(ConfigError::UnrecognizedShape)?;
    let mut out: Map<String, Value> = obj.clone();

    if !out.contains_key("conversion_mode") {
        out.insert("conversion_mode".into(), Value::String("marker".into()));
    }

    if let Some(gpu_config) = out.remove("gpu_config") {
        let is_marker = out.get("conversion_mode").and_then(Value::as_str) == Some("marker");
        if is_marker {
            out.insert("gpu".into(), upgrade_gpu_record(gpu_config));
        }
    }

    Ok(Value::Object(out))
}

fn upgrade_gpu_record(record: Value) -> Value {
    let Value::Object(mut gpu) = record else {
        return record;
    };
    for (old, new) in [("devices", "num_devices"), ("workers", "num_workers")] {
        if let Some(v) = gpu.remove(old) {
            gpu.entry(new.to_string()).or_insert(v);
        }
    }
    if gpu.remove("memory_limit").is_some() {
        debug!("Dropping legacy gpu_config.memory_limit: no counterpart in current shape");
    }
    Value::Object(gpu)
}
