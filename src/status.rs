//! Latency classification.
//!
//! [`QualityTier`] is the single ordered classification. The per-key and the
//! aggregate status surfaces each present it with their own labels, which the
//! web client already depends on, so both vocabularies are kept.

use serde::Serialize;

use crate::domain::ServerConfigStatus;

pub const EXCELLENT_BELOW_MS: u32 = 50;
pub const GOOD_BELOW_MS: u32 = 100;
pub const FAIR_BELOW_MS: u32 = 200;

/// Ordered from best to worst. `Offline` means unreachable, `Poor` means slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
}

impl QualityTier {
    pub fn classify(alive: bool, ping_ms: Option<u32>) -> Self {
        let Some(ping_ms) = ping_ms.filter(|_| alive) else {
            return Self::Offline;
        };
        match ping_ms {
            p if p < EXCELLENT_BELOW_MS => Self::Excellent,
            p if p < GOOD_BELOW_MS => Self::Good,
            p if p < FAIR_BELOW_MS => Self::Fair,
            _ => Self::Poor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Offline => "offline",
        }
    }
}

/// Labels of the per-key status path, including its terminal non-probe states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
    Inactive,
    NoKey,
    InvalidKey,
}

impl KeyTier {
    pub fn display_text(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent connection",
            Self::Good => "Good connection",
            Self::Fair => "Slow connection",
            Self::Poor => "Poor connection",
            Self::Offline => "Server inactive",
            Self::Inactive => "User inactive",
            Self::NoKey => "Key not configured",
            Self::InvalidKey => "Malformed key",
        }
    }
}

impl From<QualityTier> for KeyTier {
    fn from(value: QualityTier) -> Self {
        match value {
            QualityTier::Excellent => Self::Excellent,
            QualityTier::Good => Self::Good,
            QualityTier::Fair => Self::Fair,
            QualityTier::Poor => Self::Poor,
            QualityTier::Offline => Self::Offline,
        }
    }
}

/// Labels of the aggregate server status path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerTier {
    Excellent,
    Online,
    Slow,
    Poor,
    Offline,
}

impl ServerTier {
    pub fn display_text(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent connection",
            Self::Online => "Good connection",
            Self::Slow => "Slow connection",
            Self::Poor => "Poor connection",
            Self::Offline => "Server unreachable",
        }
    }
}

impl From<QualityTier> for ServerTier {
    fn from(value: QualityTier) -> Self {
        match value {
            QualityTier::Excellent => Self::Excellent,
            QualityTier::Good => Self::Online,
            QualityTier::Fair => Self::Slow,
            QualityTier::Poor => Self::Poor,
            QualityTier::Offline => Self::Offline,
        }
    }
}

impl From<ServerTier> for ServerConfigStatus {
    fn from(value: ServerTier) -> Self {
        match value {
            ServerTier::Excellent => Self::Excellent,
            ServerTier::Online => Self::Online,
            ServerTier::Slow => Self::Slow,
            ServerTier::Poor => Self::Poor,
            ServerTier::Offline => Self::Offline,
        }
    }
}

pub fn classify_key(alive: bool, ping_ms: Option<u32>) -> (KeyTier, &'static str) {
    let tier = KeyTier::from(QualityTier::classify(alive, ping_ms));
    (tier, tier.display_text())
}

pub fn classify_server(alive: bool, ping_ms: Option<u32>) -> (ServerTier, &'static str) {
    let tier = ServerTier::from(QualityTier::classify(alive, ping_ms));
    (tier, tier.display_text())
}

pub fn format_ping(ping_ms: u32) -> String {
    format!("{ping_ms} ms")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn boundaries_follow_half_open_ranges() {
        let cases = [
            (0, QualityTier::Excellent),
            (49, QualityTier::Excellent),
            (50, QualityTier::Good),
            (99, QualityTier::Good),
            (100, QualityTier::Fair),
            (199, QualityTier::Fair),
            (200, QualityTier::Poor),
            (5_000, QualityTier::Poor),
        ];
        for (ping, expected) in cases {
            assert_eq!(QualityTier::classify(true, Some(ping)), expected, "{ping}ms");
        }
    }

    #[test]
    fn not_alive_is_offline_regardless_of_ping() {
        for ping in [None, Some(0), Some(10), Some(150), Some(999)] {
            assert_eq!(QualityTier::classify(false, ping), QualityTier::Offline);
        }
        assert_eq!(QualityTier::classify(true, None), QualityTier::Offline);
    }

    #[test]
    fn tiers_are_ordered_by_latency() {
        assert!(QualityTier::Excellent < QualityTier::Good);
        assert!(QualityTier::Good < QualityTier::Fair);
        assert!(QualityTier::Fair < QualityTier::Poor);
        assert!(QualityTier::Poor < QualityTier::Offline);
    }

    #[test]
    fn the_two_surfaces_keep_their_own_labels() {
        assert_eq!(classify_key(true, Some(70)), (KeyTier::Good, "Good connection"));
        assert_eq!(classify_server(true, Some(70)), (ServerTier::Online, "Good connection"));
        assert_eq!(classify_key(true, Some(150)), (KeyTier::Fair, "Slow connection"));
        assert_eq!(classify_server(true, Some(150)), (ServerTier::Slow, "Slow connection"));
        assert_eq!(classify_key(false, None), (KeyTier::Offline, "Server inactive"));
        assert_eq!(
            classify_server(false, None),
            (ServerTier::Offline, "Server unreachable")
        );
    }

    #[test]
    fn labels_serialize_as_the_client_expects() {
        assert_eq!(serde_json::to_value(KeyTier::NoKey).unwrap(), "no-key");
        assert_eq!(serde_json::to_value(KeyTier::InvalidKey).unwrap(), "invalid-key");
        assert_eq!(serde_json::to_value(ServerTier::Online).unwrap(), "online");
        assert_eq!(serde_json::to_value(QualityTier::Fair).unwrap(), "fair");
    }
}
