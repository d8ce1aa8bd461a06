//! Ordered request presets for the play-data endpoint.
//!
//! Order is priority: presets likely to produce direct files come first,
//! segmented-only presets last.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::types::PlayTarget;

/// Parameters the client sets itself; a strategy must not override them.
pub const RESERVED_PARAMS: &[&str] = &["wts", "w_rid", "bvid", "aid", "avid", "cid"];

/// Response shape a preset is expected to elicit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    Direct,
    Segmented,
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseShape::Direct => f.write_str("direct"),
            ResponseShape::Segmented => f.write_str("segmented"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStrategy {
    pub name: String,
    pub expects: ResponseShape,
    #[serde(default, deserialize_with = "params_as_strings")]
    pub params: BTreeMap<String, String>,
}

impl RequestStrategy {
    pub fn new(name: impl Into<String>, expects: ResponseShape, params: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            expects,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Unsigned query for `target`: common fields, then the preset's own.
    pub fn request_params(&self, target: &PlayTarget, quality: u32) -> BTreeMap<String, String> {
        let mut params = target.id_params();
        params.insert("qn".to_string(), quality.to_string());
        params.insert("type".to_string(), String::new());
        params.insert("otype".to_string(), "json".to_string());
        params.insert("fnver".to_string(), "0".to_string());

        for (key, value) in &self.params {
            if !RESERVED_PARAMS.contains(&key.as_str()) {
                params.insert(key.clone(), value.clone());
            }
        }
        params
    }

    /// Preset keys that collide with client-managed fields
    pub fn reserved_overrides(&self) -> Vec<&str> {
        self.params
            .keys()
            .map(String::as_str)
            .filter(|key| RESERVED_PARAMS.contains(key))
            .collect()
    }
}

/// Built-in table, highest priority first.
pub fn default_strategies() -> Vec<RequestStrategy> {
    vec![
        RequestStrategy::new(
            "html5-download",
            ResponseShape::Direct,
            &[
                ("platform", "html5"),
                ("download", "1"),
                ("fnval", "16"),
                ("fourk", "0"),
                ("force_host", "2"),
            ],
        ),
        RequestStrategy::new(
            "android-durl",
            ResponseShape::Direct,
            &[("platform", "android"), ("fnval", "0"), ("fourk", "0")],
        ),
        RequestStrategy::new(
            "pc-dash",
            ResponseShape::Segmented,
            &[("platform", "pc"), ("fnval", "4048"), ("fourk", "1")],
        ),
    ]
}

/// TOML presets may write `download = 1`; the wire wants strings.
fn params_as_strings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => u8::from(b).to_string(),
                serde_json::Value::Null => String::new(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "strategy parameter '{}' must be a scalar, got {}",
                        key, other
                    )));
                }
            };
            Ok((key, text))
        })
        .collect()
}
