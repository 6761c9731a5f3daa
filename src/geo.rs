use std::{
    net::IpAddr,
    path::Path,
    sync::{Arc, LazyLock},
};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

pub const UNKNOWN_LOCATION: &str = "Unknown location";

// Operator-curated; wins over any database answer.
const KNOWN_HOSTS: &[(&str, &str)] = &[
    ("167.17.176.34", "Germany"),
    ("167.17.176.33", "Germany"),
    ("8.8.8.8", "USA"),
    ("8.8.4.4", "USA"),
    ("1.1.1.1", "USA"),
    ("1.0.0.1", "USA"),
    ("208.67.222.222", "USA"),
    ("208.67.220.220", "USA"),
    ("77.88.8.8", "Russia"),
    ("77.88.8.1", "Russia"),
];

const KNOWN_DOMAINS: &[(&str, &str)] = &[
    ("google.com", "USA"),
    ("cloudflare.com", "USA"),
    ("github.com", "USA"),
];

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("US", "USA"),
    ("RU", "Russia"),
    ("NL", "Netherlands"),
    ("DE", "Germany"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("CN", "China"),
    ("JP", "Japan"),
    ("KR", "South Korea"),
    ("SG", "Singapore"),
    ("CA", "Canada"),
    ("AU", "Australia"),
    ("IT", "Italy"),
    ("ES", "Spain"),
    ("PL", "Poland"),
    ("CH", "Switzerland"),
    ("NO", "Norway"),
    ("SE", "Sweden"),
    ("FI", "Finland"),
    ("BR", "Brazil"),
    ("IN", "India"),
    ("UA", "Ukraine"),
    ("TR", "Turkey"),
    ("AE", "UAE"),
    ("HK", "Hong Kong"),
];

static DOMAIN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("domain name regex")
});

pub fn looks_like_domain(host: &str) -> bool {
    DOMAIN_NAME.is_match(host)
}

pub fn country_display_name(code: &str) -> String {
    COUNTRY_NAMES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| code.to_string())
}

/// One step of the location fallback chain.
pub trait LocationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate(&self, host: &str) -> Option<String>;
}

pub struct StaticHostTable {
    entries: Vec<(String, String)>,
}

impl StaticHostTable {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(
            KNOWN_HOSTS
                .iter()
                .map(|(host, label)| (host.to_string(), label.to_string())),
        )
    }
}

impl LocationStrategy for StaticHostTable {
    fn name(&self) -> &'static str {
        "static_hosts"
    }

    fn locate(&self, host: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|(known, _)| known == host)
            .map(|(_, label)| label.clone())
    }
}

/// Domains never go to reverse DNS or the database: a curated label or a
/// generic `Domain: <host>` one.
pub struct DomainTable;

impl LocationStrategy for DomainTable {
    fn name(&self) -> &'static str {
        "domains"
    }

    fn locate(&self, host: &str) -> Option<String> {
        if !looks_like_domain(host) {
            return None;
        }
        let lowered = host.to_ascii_lowercase();
        let label = KNOWN_DOMAINS
            .iter()
            .find(|(domain, _)| *domain == lowered)
            .map(|(_, label)| (*label).to_string())
            .unwrap_or_else(|| format!("Domain: {host}"));
        Some(label)
    }
}

/// Answers an IP literal with its ISO country code.
pub trait CountryLookup: Send + Sync {
    fn country_code(&self, ip: IpAddr) -> Option<String>;
}

pub struct MaxMindCountryLookup {
    reader: maxminddb::Reader<Vec<u8>>,
}

#[derive(Deserialize)]
struct CountryRecord {
    country: Option<CountryNames>,
    registered_country: Option<CountryNames>,
}

#[derive(Deserialize)]
struct CountryNames {
    iso_code: Option<String>,
}

impl MaxMindCountryLookup {
    pub fn open(path: &Path) -> Result<Self, maxminddb::MaxMindDbError> {
        let reader = maxminddb::Reader::open_readfile(path)?;
        Ok(Self { reader })
    }
}

impl CountryLookup for MaxMindCountryLookup {
    fn country_code(&self, ip: IpAddr) -> Option<String> {
        let record = match self
            .reader
            .lookup(ip)
            .and_then(|found| found.decode::<CountryRecord>())
        {
            Ok(record) => record?,
            Err(err) => {
                warn!(%ip, %err, "geoip lookup failed");
                return None;
            }
        };
        record
            .country
            .and_then(|c| c.iso_code)
            .or_else(|| record.registered_country.and_then(|c| c.iso_code))
    }
}

pub struct IpDatabase {
    lookup: Arc<dyn CountryLookup>,
}

impl IpDatabase {
    pub fn new(lookup: Arc<dyn CountryLookup>) -> Self {
        Self { lookup }
    }
}

impl LocationStrategy for IpDatabase {
    fn name(&self) -> &'static str {
        "ip_database"
    }

    fn locate(&self, host: &str) -> Option<String> {
        let ip = host.parse::<IpAddr>().ok()?;
        let code = self.lookup.country_code(ip)?;
        Some(country_display_name(&code))
    }
}

/// First strategy that answers wins; no answer means [`UNKNOWN_LOCATION`].
pub struct LocationResolver {
    strategies: Vec<Box<dyn LocationStrategy>>,
}

impl LocationResolver {
    pub fn new(strategies: Vec<Box<dyn LocationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Static hosts, then domains, then the country database when one is available.
    pub fn standard(country_lookup: Option<Arc<dyn CountryLookup>>) -> Self {
        let mut strategies: Vec<Box<dyn LocationStrategy>> =
            vec![Box::new(StaticHostTable::builtin()), Box::new(DomainTable)];
        if let Some(lookup) = country_lookup {
            strategies.push(Box::new(IpDatabase::new(lookup)));
        }
        Self::new(strategies)
    }

    /// Like [`standard`](Self::standard), opening the MaxMind database at `path`.
    /// An unreadable database is logged and skipped.
    pub fn from_geoip_path(path: Option<&Path>) -> Self {
        let lookup = path.and_then(|path| match MaxMindCountryLookup::open(path) {
            Ok(lookup) => Some(Arc::new(lookup) as Arc<dyn CountryLookup>),
            Err(err) => {
                warn!(path = %path.display(), %err, "open geoip database failed; ip lookups disabled");
                None
            }
        });
        Self::standard(lookup)
    }

    pub fn resolve(&self, host: &str) -> String {
        let host = host.trim();
        for strategy in &self.strategies {
            if let Some(label) = strategy.locate(host).filter(|l| !l.is_empty()) {
                debug!(host, strategy = strategy.name(), %label, "location resolved");
                return label;
            }
        }
        UNKNOWN_LOCATION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    struct FakeCountries(BTreeMap<IpAddr, &'static str>);

    impl CountryLookup for FakeCountries {
        fn country_code(&self, ip: IpAddr) -> Option<String> {
            self.0.get(&ip).map(|c| c.to_string())
        }
    }

    fn resolver_with(entries: &[(&str, &'static str)]) -> LocationResolver {
        let map = entries
            .iter()
            .map(|(ip, code)| (ip.parse().unwrap(), *code))
            .collect();
        LocationResolver::standard(Some(Arc::new(FakeCountries(map))))
    }

    #[test]
    fn static_table_wins_over_database() {
        let resolver = resolver_with(&[("167.17.176.34", "NL")]);
        assert_eq!(resolver.resolve("167.17.176.34"), "Germany");
    }

    #[test]
    fn database_codes_are_translated_or_passed_through() {
        let resolver = resolver_with(&[("203.0.113.5", "FI"), ("198.51.100.9", "ZZ")]);
        assert_eq!(resolver.resolve("203.0.113.5"), "Finland");
        assert_eq!(resolver.resolve("198.51.100.9"), "ZZ");
    }

    #[test]
    fn domains_use_curated_table_then_generic_label() {
        let resolver = resolver_with(&[]);
        assert_eq!(resolver.resolve("GitHub.com"), "USA");
        assert_eq!(resolver.resolve("vpn.example.org"), "Domain: vpn.example.org");
    }

    #[test]
    fn unmatched_hosts_get_the_sentinel() {
        let resolver = resolver_with(&[]);
        assert_eq!(resolver.resolve("203.0.113.77"), UNKNOWN_LOCATION);
        assert_eq!(resolver.resolve("not_a_host"), UNKNOWN_LOCATION);
        assert_eq!(resolver.resolve(""), UNKNOWN_LOCATION);
        assert_eq!(LocationResolver::standard(None).resolve("203.0.113.5"), UNKNOWN_LOCATION);
    }

    #[test]
    fn missing_database_file_degrades_to_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = LocationResolver::from_geoip_path(Some(&tmp.path().join("missing.mmdb")));
        assert_eq!(resolver.resolve("8.8.8.8"), "USA");
        assert_eq!(resolver.resolve("203.0.113.5"), UNKNOWN_LOCATION);
    }

    #[test]
    fn first_matching_strategy_wins() {
        struct Fixed(&'static str, Option<&'static str>);
        impl LocationStrategy for Fixed {
            fn name(&self) -> &'static str {
                self.0
            }
            fn locate(&self, _host: &str) -> Option<String> {
                self.1.map(str::to_string)
            }
        }

        let resolver = LocationResolver::new(vec![
            Box::new(Fixed("none", None)),
            Box::new(Fixed("empty", Some(""))),
            Box::new(Fixed("first", Some("A"))),
            Box::new(Fixed("second", Some("B"))),
        ]);
        assert_eq!(resolver.resolve("anything"), "A");
    }

    #[test]
    fn domain_pattern_excludes_ip_literals() {
        assert!(looks_like_domain("vpn.example.com"));
        assert!(!looks_like_domain("203.0.113.5"));
        assert!(!looks_like_domain("localhost"));
        assert!(!looks_like_domain("2001:db8::1"));
    }
}
