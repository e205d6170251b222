//! Normalized source metadata.
//!
//! Sources describe their metadata in different shapes: a typed attribute
//! struct, a JSON mapping, or flat key/value pairs such as an ImageJ
//! description. [`SourceMetadata::from_repr`] is the single conversion from
//! any of them into one normalized form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SourceError;

/// Physical pixel size in micrometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

/// Typed acquisition attributes.
///
/// Field names accept both camelCase and snake_case spellings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    #[serde(default, alias = "pixel_size_um")]
    pub pixel_size_um: Option<PixelSize>,

    #[serde(default, alias = "channel_names")]
    pub channel_names: Vec<String>,

    /// Interval between time points in milliseconds.
    #[serde(default, alias = "period_ms", alias = "time_increment_ms")]
    pub period_ms: Option<f64>,
}

/// The supported metadata representations.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataRepr {
    /// Already-typed attributes.
    Attributes(Attributes),
    /// A JSON object whose fields follow [`Attributes`].
    Json(Value),
    /// Flat `key=value` pairs.
    Pairs(Vec<(String, String)>),
}

/// Metadata of a source in normalized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_size: Option<PixelSize>,
    pub channel_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_increment_ms: Option<f64>,
    /// Every attribute the source reported, as JSON values.
    pub attributes: Map<String, Value>,
}

impl SourceMetadata {
    /// Convert any supported representation into normalized metadata.
    pub fn from_repr(repr: MetadataRepr) -> Result<Self, SourceError> {
        match repr {
            MetadataRepr::Attributes(attrs) => {
                let attributes = match serde_json::to_value(&attrs) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => Map::new(),
                    Err(e) => return Err(SourceError::Metadata(e.to_string())),
                };
                Ok(Self::from_attributes(attrs, attributes))
            }
            MetadataRepr::Json(value) => {
                let Value::Object(map) = value else {
                    return Err(SourceError::Metadata(format!(
                        "expected a JSON object, got {}",
                        json_kind(&value)
                    )));
                };
                let attrs: Attributes = serde_json::from_value(Value::Object(map.clone()))
                    .map_err(|e| SourceError::Metadata(e.to_string()))?;
                Ok(Self::from_attributes(attrs, map))
            }
            MetadataRepr::Pairs(pairs) => Ok(Self::from_pairs(pairs)),
        }
    }

    fn from_attributes(attrs: Attributes, attributes: Map<String, Value>) -> Self {
        Self {
            pixel_size: attrs.pixel_size_um,
            channel_names: attrs.channel_names,
            time_increment_ms: attrs.period_ms,
            attributes,
        }
    }

    /// Pairs understand both generic keys (`pixel_size_x`, `channel_names`,
    /// `period_ms`, ...) and the ImageJ ones (`spacing`, `finterval`,
    /// `unit`).
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut attributes = Map::new();
        for (key, value) in &pairs {
            attributes.insert(key.clone(), scalar_value(value));
        }

        let number = |keys: &[&str]| {
            keys.iter().find_map(|k| {
                pairs
                    .iter()
                    .find(|(key, _)| key == k)
                    .and_then(|(_, v)| v.trim().parse::<f64>().ok())
            })
        };
        let text = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim().to_string())
        };

        // ImageJ lengths are only meaningful in microns
        let unit_is_micron = text("unit").map_or(true, |u| {
            matches!(u.as_str(), "micron" | "um" | "µm" | "\\u00B5m")
        });

        let x = number(&["pixel_size_x", "PhysicalSizeX"]);
        let y = number(&["pixel_size_y", "PhysicalSizeY"]).or(x);
        let z = number(&["pixel_size_z", "PhysicalSizeZ"])
            .or_else(|| unit_is_micron.then(|| number(&["spacing"])).flatten());
        let pixel_size = match (x, y) {
            (Some(x), Some(y)) => Some(PixelSize { x, y, z }),
            _ => None,
        };

        let channel_names = text("channel_names")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let time_increment_ms = number(&["period_ms", "time_increment_ms"])
            .or_else(|| number(&["finterval"]).map(|s| s * 1000.0));

        Self {
            pixel_size,
            channel_names,
            time_increment_ms,
            attributes,
        }
    }

    /// Name of channel `index`, falling back to `"Channel {index}"`.
    pub fn channel_name(&self, index: usize) -> String {
        self.channel_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Channel {}", index))
    }
}

fn scalar_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
