use serde::Serialize;

use crate::{
    domain::{DomainError, KeyType},
    geo::LocationResolver,
    probe::{Pinger, ProbeOptions, probe_host},
    state::UserDirectory,
    status::{KeyTier, classify_key, format_ping},
    uri::extract_host,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerRef {
    pub ip: String,
    pub location: String,
}

/// Point-in-time status of one user's key. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub status: KeyTier,
    pub status_text: &'static str,
    pub ping: Option<String>,
    pub ping_raw: u32,
    pub is_online: bool,
    pub server: Option<ServerRef>,
    pub error: Option<String>,
}

impl KeyStatus {
    fn terminal(tier: KeyTier) -> Self {
        Self {
            status: tier,
            status_text: tier.display_text(),
            ping: None,
            ping_raw: 0,
            is_online: false,
            server: None,
            error: None,
        }
    }
}

/// Resolution steps that run before any network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyTarget {
    Terminal(KeyTier),
    Probe(String),
}

pub fn resolve_key_target(directory: &impl UserDirectory, kind: KeyType, user_id: &str) -> KeyTarget {
    let Some(user) = directory.get_user(user_id).filter(|u| u.is_active()) else {
        return KeyTarget::Terminal(KeyTier::Inactive);
    };
    let Some(raw) = user.keys.get(kind) else {
        return KeyTarget::Terminal(KeyTier::NoKey);
    };
    match extract_host(raw) {
        Some(host) => KeyTarget::Probe(host),
        None => KeyTarget::Terminal(KeyTier::InvalidKey),
    }
}

/// Probes the server behind one key once.
pub async fn probe_key(
    pinger: &dyn Pinger,
    resolver: &LocationResolver,
    target: KeyTarget,
    opts: ProbeOptions,
) -> KeyStatus {
    let host = match target {
        KeyTarget::Terminal(tier) => return KeyStatus::terminal(tier),
        KeyTarget::Probe(host) => host,
    };

    let result = probe_host(pinger, &host, opts).await;
    let location = resolver.resolve(&host);
    let (tier, text) = classify_key(result.alive, result.round_trip_millis);
    let ping_raw = result.round_trip_millis.unwrap_or(0);

    KeyStatus {
        status: tier,
        status_text: text,
        ping: result.alive.then(|| format_ping(ping_raw)),
        ping_raw,
        is_online: result.alive,
        server: Some(ServerRef { ip: host, location }),
        error: result.error_reason,
    }
}

/// Parses the key type then delegates to [`resolve_key_target`] and [`probe_key`].
/// The directory is only borrowed for the lookup, not across the probe.
pub async fn key_status<D: UserDirectory>(
    directory: &tokio::sync::Mutex<D>,
    pinger: &dyn Pinger,
    resolver: &LocationResolver,
    key_type: &str,
    user_id: &str,
    opts: ProbeOptions,
) -> Result<KeyStatus, DomainError> {
    let kind: KeyType = key_type.parse()?;
    let target = {
        let directory = directory.lock().await;
        resolve_key_target(&*directory, kind, user_id)
    };
    Ok(probe_key(pinger, resolver, target, opts).await)
}
