use std::{future::Future, pin::Pin, process::Stdio, time::Duration};

use serde::Serialize;
use tokio::{process::Command, time::Instant};
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MIN_REPLIES: u32 = 1;
pub const HOST_UNREACHABLE: &str = "host unreachable";
pub const INVALID_HOST: &str = "invalid host";
pub const PROBE_TIMED_OUT: &str = "probe timed out";

// Extra wall-clock allowance on top of the probe timeout for process startup and reaping.
const SCHEDULING_SLACK: Duration = Duration::from_millis(500);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    #[serde(rename = "ip")]
    pub host: String,
    pub alive: bool,
    #[serde(rename = "time")]
    pub round_trip_millis: Option<u32>,
    #[serde(rename = "error")]
    pub error_reason: Option<String>,
}

impl ProbeResult {
    pub fn alive(host: impl Into<String>, round_trip_millis: u32) -> Self {
        Self {
            host: host.into(),
            alive: true,
            round_trip_millis: Some(round_trip_millis),
            error_reason: None,
        }
    }

    pub fn dead(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            alive: false,
            round_trip_millis: None,
            error_reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub min_replies: u32,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            min_replies: DEFAULT_MIN_REPLIES,
        }
    }
}

/// A single network-layer reachability check. Implementations report every
/// failure through the returned [`ProbeResult`].
pub trait Pinger: Send + Sync + 'static {
    fn ping<'a>(&'a self, host: &'a str, opts: ProbeOptions) -> BoxFuture<'a, ProbeResult>;
}

/// Runs `pinger` under a hard deadline so a stuck implementation still resolves
/// as dead instead of holding the caller.
pub async fn probe_host(pinger: &dyn Pinger, host: &str, opts: ProbeOptions) -> ProbeResult {
    if !is_probeable_host(host) {
        return ProbeResult::dead(host, INVALID_HOST);
    }

    let started = Instant::now();
    let result = match tokio::time::timeout(opts.timeout + SCHEDULING_SLACK, pinger.ping(host, opts))
        .await
    {
        Ok(result) => result,
        Err(_) => ProbeResult::dead(host, PROBE_TIMED_OUT),
    };
    debug!(
        host,
        alive = result.alive,
        rtt_ms = result.round_trip_millis,
        elapsed_ms = started.elapsed().as_millis() as u64,
        err = result.error_reason.as_deref(),
        "probe finished"
    );
    result
}

/// Hostnames and IP literals only; keeps option-looking tokens away from `ping`.
pub fn is_probeable_host(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && !host.starts_with('-')
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b':'))
}

/// ICMP echo through the system `ping` binary, which already holds the raw
/// socket privileges an unprivileged service lacks.
#[derive(Debug, Clone)]
pub struct SystemPinger {
    bin: String,
}

impl SystemPinger {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn command(&self, host: &str, opts: ProbeOptions) -> Command {
        let wait_secs = opts.timeout.as_secs().max(1);
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-n")
            .arg("-c")
            .arg(opts.min_replies.max(1).to_string())
            .arg("-w")
            .arg(wait_secs.to_string())
            .arg("-W")
            .arg(wait_secs.to_string());
        if host.contains(':') {
            cmd.arg("-6");
        }
        cmd.arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, host: &str, opts: ProbeOptions) -> ProbeResult {
        let mut cmd = self.command(host, opts);
        let started = Instant::now();
        let output = match tokio::time::timeout(opts.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                return ProbeResult::dead(host, format!("ping binary not found: {}", self.bin));
            }
            Ok(Err(err)) => return ProbeResult::dead(host, format!("spawn ping: {err}")),
            Err(_) => return ProbeResult::dead(host, HOST_UNREACHABLE),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or(HOST_UNREACHABLE);
            return ProbeResult::dead(host, reason);
        }

        let rtt = parse_ping_rtt_millis(&stdout)
            .unwrap_or_else(|| started.elapsed().as_secs_f64() * 1000.0);
        ProbeResult::alive(host, round_millis(rtt))
    }
}

impl Default for SystemPinger {
    fn default() -> Self {
        Self::new("ping")
    }
}

impl Pinger for SystemPinger {
    fn ping<'a>(&'a self, host: &'a str, opts: ProbeOptions) -> BoxFuture<'a, ProbeResult> {
        Box::pin(self.run(host, opts))
    }
}

fn round_millis(ms: f64) -> u32 {
    ms.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Average of the `time=<ms>` fields of echo replies, falling back to the
/// `rtt min/avg/max` summary line.
pub fn parse_ping_rtt_millis(stdout: &str) -> Option<f64> {
    let samples: Vec<f64> = stdout
        .lines()
        .filter_map(|line| {
            let (_, after) = line.split_once("time=")?;
            let value = after.split(|c: char| c.is_whitespace() || c == 'm').next()?;
            value.parse::<f64>().ok()
        })
        .collect();
    if !samples.is_empty() {
        return Some(samples.iter().sum::<f64>() / samples.len() as f64);
    }

    stdout.lines().find_map(|line| {
        let (label, values) = line.split_once(" = ")?;
        if !label.contains("min/avg/max") {
            return None;
        }
        values.split('/').nth(1)?.trim().parse::<f64>().ok()
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const LINUX_OUTPUT: &str = "PING 203.0.113.5 (203.0.113.5) 56(84) bytes of data.
64 bytes from 203.0.113.5: icmp_seq=1 ttl=57 time=23.6 ms
64 bytes from 203.0.113.5: icmp_seq=2 ttl=57 time=24.4 ms

--- 203.0.113.5 ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
rtt min/avg/max/mdev = 23.600/24.000/24.400/0.400 ms
";

    #[test]
    fn parses_average_of_reply_times() {
        assert_eq!(parse_ping_rtt_millis(LINUX_OUTPUT), Some(24.0));
    }

    #[test]
    fn parses_summary_when_reply_lines_are_missing() {
        let out = "round-trip min/avg/max/stddev = 10.1/12.5/14.9/1.0 ms\n";
        assert_eq!(parse_ping_rtt_millis(out), Some(12.5));
        assert_eq!(parse_ping_rtt_millis("garbage"), None);
    }

    #[test]
    fn busybox_style_reply_is_parsed() {
        let out = "64 bytes from 10.0.0.1: seq=0 ttl=64 time=0.512 ms\n";
        assert_eq!(parse_ping_rtt_millis(out), Some(0.512));
        assert_eq!(round_millis(0.512), 1);
        assert_eq!(round_millis(49.5), 50);
    }

    #[test]
    fn probeable_host_rejects_option_like_and_odd_tokens() {
        assert!(is_probeable_host("203.0.113.5"));
        assert!(is_probeable_host("vpn.example.com"));
        assert!(is_probeable_host("2001:db8::1"));
        assert!(!is_probeable_host("-c1000"));
        assert!(!is_probeable_host("host name"));
        assert!(!is_probeable_host("a/b"));
        assert!(!is_probeable_host(""));
    }

    struct Stuck;

    impl Pinger for Stuck {
        fn ping<'a>(&'a self, _host: &'a str, _opts: ProbeOptions) -> BoxFuture<'a, ProbeResult> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_pinger_resolves_as_dead_after_deadline() {
        let opts = ProbeOptions {
            timeout: Duration::from_millis(1_000),
            min_replies: 1,
        };
        let started = Instant::now();
        let result = probe_host(&Stuck, "203.0.113.5", opts).await;
        assert!(!result.alive);
        assert_eq!(result.round_trip_millis, None);
        assert_eq!(result.error_reason.as_deref(), Some(PROBE_TIMED_OUT));
        assert!(started.elapsed() <= opts.timeout + SCHEDULING_SLACK);
    }

    #[tokio::test]
    async fn invalid_host_is_dead_without_pinging() {
        let result = probe_host(&Stuck, "--flood", ProbeOptions::default()).await;
        assert_eq!(result, ProbeResult::dead("--flood", INVALID_HOST));
    }

    #[tokio::test]
    async fn missing_ping_binary_is_reported_not_raised() {
        let pinger = SystemPinger::new("/nonexistent/vkm-ping");
        let result = probe_host(&pinger, "203.0.113.5", ProbeOptions::default()).await;
        assert!(!result.alive);
        assert!(result.error_reason.unwrap().contains("not found"));
    }
}
