use std::collections::BTreeSet;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::info;

use crate::{
    domain::User,
    geo::LocationResolver,
    probe::{Pinger, ProbeOptions, ProbeResult, probe_host},
    uri::extract_host,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedProbe {
    #[serde(flatten)]
    pub probe: ProbeResult,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FanoutOutcome {
    pub best: Option<LocatedProbe>,
    pub all: Vec<LocatedProbe>,
}

/// Distinct hosts from every configured key of every active user, in first-seen order.
pub fn collect_candidate_hosts(users: &[User]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut hosts = Vec::new();
    for user in users.iter().filter(|u| u.is_active()) {
        for (_, raw) in user.keys.configured() {
            if let Some(host) = extract_host(raw)
                && seen.insert(host.clone())
            {
                hosts.push(host);
            }
        }
    }
    hosts
}

/// Index of the reachable result with the lowest round trip; the first result
/// when nothing is reachable. Earlier results win ties.
pub fn select_best(results: &[ProbeResult]) -> Option<usize> {
    if results.is_empty() {
        return None;
    }

    let mut best: Option<(usize, u32)> = None;
    for (idx, result) in results.iter().enumerate().filter(|(_, r)| r.alive) {
        let rtt = result.round_trip_millis.unwrap_or(u32::MAX);
        match best {
            Some((_, best_rtt)) if rtt >= best_rtt => {}
            _ => best = Some((idx, rtt)),
        }
    }
    Some(best.map_or(0, |(idx, _)| idx))
}

/// Probes every host at once and waits for all of them; a slow member only
/// costs its own timeout.
pub async fn probe_all(
    pinger: &dyn Pinger,
    resolver: &LocationResolver,
    hosts: &[String],
    opts: ProbeOptions,
) -> FanoutOutcome {
    if hosts.is_empty() {
        return FanoutOutcome::default();
    }

    let results = join_all(hosts.iter().map(|host| probe_host(pinger, host, opts))).await;
    let best_idx = select_best(&results);

    let all: Vec<LocatedProbe> = results
        .into_iter()
        .map(|probe| LocatedProbe {
            location: resolver.resolve(&probe.host),
            probe,
        })
        .collect();
    let best = best_idx.and_then(|idx| all.get(idx).cloned());

    info!(
        candidates = all.len(),
        alive = all.iter().filter(|r| r.probe.alive).count(),
        best = best.as_ref().map(|b| b.probe.host.as_str()),
        "server fan-out probe finished"
    );

    FanoutOutcome { best, all }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{collections::BTreeMap, time::Duration};

    use crate::probe::{BoxFuture, Pinger, ProbeOptions, ProbeResult};

    /// Canned answers per host with an optional artificial delay; unknown hosts are dead.
    #[derive(Default)]
    pub struct ScriptedPinger {
        pub answers: BTreeMap<String, (Option<u32>, Duration)>,
    }

    impl ScriptedPinger {
        pub fn alive(mut self, host: &str, rtt_ms: u32) -> Self {
            self.answers
                .insert(host.to_string(), (Some(rtt_ms), Duration::ZERO));
            self
        }

        pub fn dead(mut self, host: &str) -> Self {
            self.answers.insert(host.to_string(), (None, Duration::ZERO));
            self
        }

        pub fn slow(mut self, host: &str, rtt_ms: Option<u32>, delay: Duration) -> Self {
            self.answers.insert(host.to_string(), (rtt_ms, delay));
            self
        }
    }

    impl Pinger for ScriptedPinger {
        fn ping<'a>(&'a self, host: &'a str, opts: ProbeOptions) -> BoxFuture<'a, ProbeResult> {
            Box::pin(async move {
                let (rtt, delay) = self
                    .answers
                    .get(host)
                    .copied()
                    .unwrap_or((None, Duration::ZERO));
                if delay >= opts.timeout {
                    tokio::time::sleep(opts.timeout).await;
                    return ProbeResult::dead(host, crate::probe::HOST_UNREACHABLE);
                }
                tokio::time::sleep(delay).await;
                match rtt {
                    Some(rtt) => ProbeResult::alive(host, rtt),
                    None => ProbeResult::dead(host, crate::probe::HOST_UNREACHABLE),
                }
            })
        }
    }
}
