use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    InvalidKeyType { key_type: String },
    MissingServerIp,
    MissingUser { user_id: String },
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidKeyType { .. } | Self::MissingServerIp => "invalid_request",
            Self::MissingUser { .. } => "not_found",
        }
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKeyType { key_type } => write!(f, "invalid key type: {key_type}"),
            Self::MissingServerIp => write!(f, "ip is required"),
            Self::MissingUser { user_id } => write!(f, "user not found: {user_id}"),
        }
    }
}

impl std::error::Error for DomainError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Vless,
    Shadowsocks,
}

impl KeyType {
    pub const ALL: [KeyType; 2] = [KeyType::Vless, KeyType::Shadowsocks];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vless => "vless",
            Self::Shadowsocks => "shadowsocks",
        }
    }
}

impl FromStr for KeyType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::InvalidKeyType {
                key_type: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Blocked,
}

/// One raw connection string per protocol slot. An empty string means the slot
/// is not configured; the JSON shape matches what the user-management side writes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserKeys {
    #[serde(default)]
    pub vless: String,
    #[serde(default)]
    pub shadowsocks: String,
}

impl UserKeys {
    pub fn get(&self, kind: KeyType) -> Option<&str> {
        let raw = match kind {
            KeyType::Vless => self.vless.as_str(),
            KeyType::Shadowsocks => self.shadowsocks.as_str(),
        };
        (!raw.trim().is_empty()).then_some(raw)
    }

    pub fn set(&mut self, kind: KeyType, raw: impl Into<String>) {
        let slot = match kind {
            KeyType::Vless => &mut self.vless,
            KeyType::Shadowsocks => &mut self.shadowsocks,
        };
        *slot = raw.into();
    }

    /// Configured keys in `KeyType::ALL` order.
    pub fn configured(&self) -> impl Iterator<Item = (KeyType, &str)> {
        KeyType::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|raw| (kind, raw)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub keys: UserKeys,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Stored status label of the deployment's current server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerConfigStatus {
    Excellent,
    Online,
    Slow,
    Poor,
    Offline,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub location: String,
    /// Round-trip time of the last check, 0 when the server did not answer.
    #[serde(default)]
    pub last_ping: u32,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ServerConfigStatus,
}

pub fn validate_server_ip(ip: Option<&str>) -> Result<String, DomainError> {
    let ip = ip.map(str::trim).unwrap_or_default();
    if ip.is_empty() {
        return Err(DomainError::MissingServerIp);
    }
    Ok(ip.to_string())
}
