use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Version literal written into every snapshot and the only one restore accepts.
pub const FORMAT_VERSION: &str = "1.0";

/// Settings keys that are never exported nor imported.
pub const SECRET_KEYS: [&str; 2] = ["admin_password", "webdav_password"];

pub const DEFAULT_CATEGORY_COLOR: &str = "#ff9a56";

pub fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.contains(&key)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

impl Category {
    /// Fills the fields a restore must never leave empty.
    pub fn with_defaults(mut self) -> Self {
        self.icon = Some(self.icon.unwrap_or_default());
        self.color = Some(
            self.color
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_owned()),
        );
        self.sort_order = Some(self.sort_order.unwrap_or(0));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

impl Site {
    pub fn with_defaults(mut self) -> Self {
        self.description = Some(self.description.unwrap_or_default());
        self.logo = Some(self.logo.unwrap_or_default());
        self.sort_order = Some(self.sort_order.unwrap_or(0));
        self
    }
}

/// Full export of the record tables plus non-secret settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(rename = "exportTime", default)]
    pub export_time: String,
    /// Empty only for documents written without a version field.
    #[serde(default)]
    pub version: String,
    pub categories: Vec<Category>,
    pub sites: Vec<Site>,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl SnapshotDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
