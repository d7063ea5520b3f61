//! Resource records shared by the REST facades and the daemon protocol.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A server as listed by `/api/servers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server identifier, also used in daemon paths.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Node the server is hosted on.
    #[serde(default)]
    pub node: Value,
}

/// Envelope of the server list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerList {
    /// Listed servers.
    #[serde(default)]
    pub servers: Vec<ServerInfo>,
}

/// Running state reported by the daemon status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Whether the server process is running.
    pub running: bool,
}

/// RAM and CPU usage of a server.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageStats {
    /// Memory used, in bytes.
    #[serde(default)]
    pub memory: f64,
    /// CPU usage in percent; 100 represents one full core.
    #[serde(default)]
    pub cpu: f64,
}

/// File entry exactly as the daemon sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFileEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modify_time: i64,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub is_file: bool,
}

/// A regular file in a server's file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// File name, without directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modify_time: DateTime<Utc>,
    /// File extension including the leading dot, if any.
    pub extension: String,
}

/// `modifyTime` values at or above this are milliseconds (year 5138 in seconds).
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

fn modify_time(raw: i64) -> DateTime<Utc> {
    let parsed = if (-MILLIS_THRESHOLD..MILLIS_THRESHOLD).contains(&raw) {
        DateTime::from_timestamp(raw, 0)
    } else {
        DateTime::from_timestamp_millis(raw)
    };
    parsed.unwrap_or_default()
}

impl RawFileEntry {
    /// Convert to a [`FileEntry`], or `None` for directories.
    ///
    /// The daemon reports `modifyTime` in Unix seconds, but millisecond
    /// values (as JavaScript clients produce) are accepted too. Out-of-range
    /// values map to the epoch.
    #[must_use]
    pub fn into_file(self) -> Option<FileEntry> {
        if !self.is_file {
            return None;
        }
        Some(FileEntry {
            name: self.name,
            size: self.size,
            modify_time: modify_time(self.modify_time),
            extension: self.extension,
        })
    }
}

/// Keep only regular files from a raw listing.
#[must_use]
pub fn files_only(entries: Vec<RawFileEntry>) -> Vec<FileEntry> {
    entries.into_iter().filter_map(RawFileEntry::into_file).collect()
}

/// The authenticated user, from `/api/self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: u64,
    pub username: String,
    pub email: String,
}

/// Template entry from `/api/templates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub name: String,
    #[serde(default)]
    pub display: String,
}

/// Type of a template variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Integer,
    Boolean,
    Options,
    #[serde(other)]
    Other,
}

/// A variable used when creating a server from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type", default = "default_variable_type")]
    pub kind: VariableType,
}

const fn default_variable_type() -> VariableType {
    VariableType::String
}

/// Full template definition from `/api/templates/<name>`.
///
/// Install and run steps are kept as raw JSON; their shape depends on the
/// daemon's operation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDetails {
    pub name: String,
    #[serde(default)]
    pub display: String,
    #[serde(default, deserialize_with = "variables")]
    pub data: BTreeMap<String, TemplateVariable>,
    #[serde(default)]
    pub install: Value,
    #[serde(default)]
    pub run: Value,
    #[serde(default)]
    pub supported_environments: Vec<Value>,
}

/// Accept template variables either keyed by name or as a list.
fn variables<'de, D>(deserializer: D) -> Result<BTreeMap<String, TemplateVariable>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Map(BTreeMap<String, TemplateVariable>),
        List(Vec<NamedVariable>),
        Null(()),
    }

    #[derive(Deserialize)]
    struct NamedVariable {
        name: String,
        #[serde(flatten)]
        variable: TemplateVariable,
    }

    Ok(match Shape::deserialize(deserializer)? {
        Shape::Map(map) => map,
        Shape::List(list) => list.into_iter().map(|v| (v.name, v.variable)).collect(),
        Shape::Null(()) => BTreeMap::new(),
    })
}
