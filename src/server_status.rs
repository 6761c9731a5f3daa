use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    domain::{DomainError, ServerConfig, ServerConfigStatus, validate_server_ip},
    fanout::{LocatedProbe, collect_candidate_hosts, probe_all},
    geo::LocationResolver,
    key_status::ServerRef,
    probe::{Pinger, ProbeOptions, ProbeResult, probe_host},
    state::{ServerConfigStore, StoreError, UserDirectory},
    status::{QualityTier, ServerTier, format_ping},
};

pub const NO_RESPONSE: &str = "No response";

#[derive(Debug)]
pub enum ServerStatusError {
    /// No active user has a key with a usable host; stored config is untouched.
    NoActiveServers,
    Domain(DomainError),
    Store(StoreError),
}

impl ServerStatusError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveServers => "no_active_servers",
            Self::Domain(e) => e.code(),
            Self::Store(_) => "internal",
        }
    }
}

impl std::fmt::Display for ServerStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveServers => write!(f, "no active vpn servers to check"),
            Self::Domain(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for ServerStatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoActiveServers => None,
            Self::Domain(e) => Some(e),
            Self::Store(e) => Some(e),
        }
    }
}

impl From<DomainError> for ServerStatusError {
    fn from(value: DomainError) -> Self {
        Self::Domain(value)
    }
}

impl From<StoreError> for ServerStatusError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub status: ServerTier,
    pub status_text: &'static str,
    pub quality: QualityTier,
    pub ping: String,
    pub ping_raw: u32,
    pub is_online: bool,
    pub response_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub last_check: DateTime<Utc>,
    pub error: Option<String>,
    pub all_servers: Vec<LocatedProbe>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalStatus {
    pub server: ServerRef,
    pub connection: ConnectionInfo,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingTest {
    pub success: bool,
    pub ping: Option<u32>,
    pub error: Option<String>,
}

impl From<ProbeResult> for PingTest {
    fn from(value: ProbeResult) -> Self {
        Self {
            success: value.alive,
            ping: value.round_trip_millis,
            error: value.error_reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOverride {
    pub server: ServerRef,
    pub auto_detected_location: bool,
    pub ping_test: PingTest,
}

/// Owner of the stored server config for the lifetime of the process.
///
/// Probing runs without holding the store. Each write is a read-modify-write
/// under the store lock, so concurrent refreshes never interleave a partial record.
pub struct ServerStatusHandle<S> {
    store: Arc<Mutex<S>>,
    pinger: Arc<dyn Pinger>,
    resolver: Arc<LocationResolver>,
    opts: ProbeOptions,
}

impl<S> ServerStatusHandle<S>
where
    S: UserDirectory + ServerConfigStore + Send,
{
    pub fn new(
        store: Arc<Mutex<S>>,
        pinger: Arc<dyn Pinger>,
        resolver: Arc<LocationResolver>,
        opts: ProbeOptions,
    ) -> Self {
        Self {
            store,
            pinger,
            resolver,
            opts,
        }
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    pub fn pinger(&self) -> &dyn Pinger {
        self.pinger.as_ref()
    }

    pub fn probe_options(&self) -> ProbeOptions {
        self.opts
    }

    pub async fn current(&self) -> ServerConfig {
        self.store.lock().await.server_config()
    }

    /// Probes every candidate server and records the best one.
    pub async fn refresh(&self) -> Result<GlobalStatus, ServerStatusError> {
        let hosts = {
            let store = self.store.lock().await;
            collect_candidate_hosts(&store.list_users())
        };

        let outcome = probe_all(self.pinger.as_ref(), &self.resolver, &hosts, self.opts).await;
        let Some(best) = outcome.best else {
            warn!("server status refresh found no candidate hosts");
            return Err(ServerStatusError::NoActiveServers);
        };

        let probe = &best.probe;
        let quality = QualityTier::classify(probe.alive, probe.round_trip_millis);
        let tier = ServerTier::from(quality);
        let ping_raw = probe.round_trip_millis.unwrap_or(0);

        let last_check = {
            let mut store = self.store.lock().await;
            let prev = store.server_config();
            let now = Utc::now();
            let last_check = prev.last_check.map_or(now, |prev| prev.max(now));
            store.set_server_config(ServerConfig {
                ip: probe.host.clone(),
                location: best.location.clone(),
                last_ping: ping_raw,
                last_check: Some(last_check),
                status: tier.into(),
            })?;
            last_check
        };
        info!(
            host = %probe.host,
            quality = quality.as_str(),
            rtt_ms = probe.round_trip_millis,
            "server config refreshed"
        );

        Ok(GlobalStatus {
            server: ServerRef {
                ip: probe.host.clone(),
                location: best.location.clone(),
            },
            connection: ConnectionInfo {
                status: tier,
                status_text: tier.display_text(),
                quality,
                ping: if probe.alive {
                    format_ping(ping_raw)
                } else {
                    NO_RESPONSE.to_string()
                },
                ping_raw,
                is_online: probe.alive,
                response_time: probe.alive.then(|| format_ping(ping_raw)),
            },
            diagnostics: Diagnostics {
                last_check,
                error: probe.error_reason.clone(),
                all_servers: outcome.all,
            },
        })
    }

    /// Admin override of the current server, bypassing the fan-out.
    ///
    /// A blank `location` is derived from `ip`. The stored status resets to
    /// `unknown` until the next refresh; the new server is probed once for the
    /// response only.
    pub async fn set_manual(
        &self,
        ip: Option<&str>,
        location: Option<&str>,
    ) -> Result<ServerOverride, ServerStatusError> {
        let ip = validate_server_ip(ip)?;
        let requested = location.map(str::trim).unwrap_or_default();
        let auto_detected_location = requested.is_empty();
        let location = if auto_detected_location {
            self.resolver.resolve(&ip)
        } else {
            requested.to_string()
        };

        {
            let mut store = self.store.lock().await;
            let prev = store.server_config();
            store.set_server_config(ServerConfig {
                ip: ip.clone(),
                location: location.clone(),
                last_ping: 0,
                last_check: prev.last_check,
                status: ServerConfigStatus::Unknown,
            })?;
        }
        info!(%ip, %location, auto_detected_location, "server config overridden");

        let ping_test: PingTest = probe_host(self.pinger.as_ref(), &ip, self.opts).await.into();

        Ok(ServerOverride {
            server: ServerRef { ip, location },
            auto_detected_location,
            ping_test,
        })
    }
}
