use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{admin_token::AdminTokenHash, probe::ProbeOptions};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vkm",
    about = "VPN key manager: server reachability and key status",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server (default).
    Run,

    /// Print an argon2id hash for use as --admin-token-hash.
    HashAdminToken(HashAdminTokenArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HashAdminTokenArgs {
    #[arg(long, env = "VKM_ADMIN_TOKEN", value_name = "TOKEN")]
    pub token: String,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "VKM_BIND",
        value_name = "ADDR",
        default_value = "127.0.0.1:3001"
    )]
    pub bind: SocketAddr,

    #[arg(
        long,
        global = true,
        env = "VKM_DATA_DIR",
        value_name = "PATH",
        default_value = "./data"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long,
        global = true,
        env = "VKM_ADMIN_TOKEN_HASH",
        value_name = "HASH",
        default_value = ""
    )]
    pub admin_token_hash: String,

    /// MaxMind country or city database used for IP locations.
    #[arg(long = "geoip-db", global = true, env = "VKM_GEOIP_DB", value_name = "PATH")]
    pub geoip_db: Option<PathBuf>,

    #[arg(
        long = "probe-timeout-ms",
        global = true,
        env = "VKM_PROBE_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(100..=60_000)
    )]
    pub probe_timeout_ms: u64,

    #[arg(
        long = "probe-min-replies",
        global = true,
        env = "VKM_PROBE_MIN_REPLIES",
        value_name = "N",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..=5)
    )]
    pub probe_min_replies: u32,

    #[arg(
        long = "ping-bin",
        global = true,
        env = "VKM_PING_BIN",
        value_name = "PATH",
        default_value = "ping"
    )]
    pub ping_bin: String,

    /// Server ip written into a freshly created state.json.
    #[arg(
        long = "bootstrap-server-ip",
        global = true,
        env = "VKM_BOOTSTRAP_SERVER_IP",
        value_name = "IP"
    )]
    pub bootstrap_server_ip: Option<String>,
}

impl Config {
    pub fn admin_token_hash(&self) -> Option<AdminTokenHash> {
        AdminTokenHash::parse(&self.admin_token_hash)
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            timeout: Duration::from_millis(self.probe_timeout_ms),
            min_replies: self.probe_min_replies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_flags_absent() {
        let cli = Cli::try_parse_from(["vkm"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config.bind, "127.0.0.1:3001".parse().unwrap());
        assert_eq!(cli.config.data_dir, PathBuf::from("./data"));
        assert_eq!(cli.config.admin_token_hash(), None);
        assert_eq!(cli.config.geoip_db, None);
        assert_eq!(cli.config.ping_bin, "ping");
        assert_eq!(cli.config.bootstrap_server_ip, None);
        assert_eq!(cli.config.probe_options(), ProbeOptions::default());
    }

    #[test]
    fn rejects_invalid_probe_timeout_ms() {
        let err = Cli::try_parse_from(["vkm", "--probe-timeout-ms", "50"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--probe-timeout-ms"));
        assert!(msg.contains("100..=60000"));
    }

    #[test]
    fn rejects_invalid_probe_min_replies() {
        let err = Cli::try_parse_from(["vkm", "--probe-min-replies", "0"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--probe-min-replies"));
        assert!(msg.contains("1..=5"));
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from(["vkm", "run", "--probe-timeout-ms", "2500"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Run)));
        assert_eq!(cli.config.probe_options().timeout, Duration::from_millis(2500));
    }

    #[test]
    fn hash_admin_token_takes_token_flag() {
        let cli = Cli::try_parse_from(["vkm", "hash-admin-token", "--token", "t0p"]).unwrap();
        let Some(Command::HashAdminToken(args)) = cli.command else {
            panic!("expected hash-admin-token");
        };
        assert_eq!(args.token, "t0p");
    }
}
