//! Connection URI parsing for VLESS and Shadowsocks share links.
//!
//! Only the parts needed to locate the server are understood:
//! `<scheme>://<credential>@<host>:<port><rest>`. Everything after the host is
//! left opaque.

pub const VLESS_SCHEME: &str = "vless://";
pub const SHADOWSOCKS_SCHEME: &str = "ss://";

/// Host tokens left behind by unconfigured key templates.
pub const PLACEHOLDER_HOST_SERVER: &str = "server";
pub const PLACEHOLDER_HOST_LOCALHOST: &str = "localhost";
pub const PLACEHOLDER_HOST_LOOPBACK_V4: &str = "127.0.0.1";

pub const PLACEHOLDER_HOSTS: [&str; 3] = [
    PLACEHOLDER_HOST_SERVER,
    PLACEHOLDER_HOST_LOCALHOST,
    PLACEHOLDER_HOST_LOOPBACK_V4,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriScheme {
    Vless,
    Shadowsocks,
}

impl UriScheme {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Vless => VLESS_SCHEME,
            Self::Shadowsocks => SHADOWSOCKS_SCHEME,
        }
    }

    fn detect(raw: &str) -> Option<(Self, &str)> {
        [Self::Vless, Self::Shadowsocks]
            .into_iter()
            .find_map(|scheme| raw.strip_prefix(scheme.prefix()).map(|rest| (scheme, rest)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConnectionUri<'a> {
    pub scheme: UriScheme,
    pub host: &'a str,
    /// `None` when the port token is not a number (templates often carry `port`).
    pub port: Option<u16>,
}

/// Parses the authority of a connection URI without judging the host. The
/// credential must be present but is not kept.
pub fn parse_connection_uri(raw: &str) -> Option<ParsedConnectionUri<'_>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (scheme, rest) = UriScheme::detect(raw)?;
    let (credential, authority) = rest.split_once('@')?;
    if credential.is_empty() {
        return None;
    }

    let (host, after_host) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (inner, tail) = bracketed.split_once(']')?;
        (inner, tail.strip_prefix(':')?)
    } else {
        authority.split_once(':')?
    };
    if host.is_empty() {
        return None;
    }

    let port_len = after_host
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(after_host.len());
    let port = after_host[..port_len].parse::<u16>().ok();

    Some(ParsedConnectionUri {
        scheme,
        host,
        port,
    })
}

pub fn is_placeholder_host(host: &str) -> bool {
    PLACEHOLDER_HOSTS
        .iter()
        .any(|placeholder| host.eq_ignore_ascii_case(placeholder))
}

/// Returns the server host a connection key points at, or `None` for empty,
/// malformed, unsupported or template keys.
pub fn extract_host(raw: &str) -> Option<String> {
    let parsed = parse_connection_uri(raw)?;
    if is_placeholder_host(parsed.host) {
        return None;
    }
    Some(parsed.host.to_string())
}
