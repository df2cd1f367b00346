use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "TABLEBOOK_";

/// Server settings, read from `TABLEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub seed_locations: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5480,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            max_connections: 256,
            compact_threshold: 1000,
            seed_locations: true,
        }
    }
}

fn read<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(&format!("{ENV_PREFIX}{name}")).and_then(|s| s.trim().parse().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: read(&lookup, "PORT").unwrap_or(defaults.port),
            bind: read(&lookup, "BIND").unwrap_or(defaults.bind),
            data_dir: read::<String>(&lookup, "DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: read(&lookup, "METRICS_PORT"),
            max_connections: read(&lookup, "MAX_CONNECTIONS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_connections),
            compact_threshold: read(&lookup, "COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            seed_locations: read::<String>(&lookup, "SEED_LOCATIONS")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.seed_locations),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("tablebook.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from_pairs(&[]), Config::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = from_pairs(&[
            ("PORT", "6000"),
            ("BIND", "127.0.0.1"),
            ("DATA_DIR", "/var/lib/tablebook"),
            ("METRICS_PORT", "9100"),
            ("MAX_CONNECTIONS", "8"),
            ("COMPACT_THRESHOLD", "50"),
            ("SEED_LOCATIONS", "false"),
        ]);
        assert_eq!(cfg.listen_addr(), "127.0.0.1:6000");
        assert_eq!(cfg.wal_path(), PathBuf::from("/var/lib/tablebook/tablebook.wal"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.max_connections, 8);
        assert_eq!(cfg.compact_threshold, 50);
        assert!(!cfg.seed_locations);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let cfg = from_pairs(&[
            ("PORT", "not-a-port"),
            ("MAX_CONNECTIONS", "0"),
            ("COMPACT_THRESHOLD", "-3"),
            ("METRICS_PORT", "99999"),
            ("SEED_LOCATIONS", "maybe"),
        ]);
        assert_eq!(cfg.port, 5480);
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.metrics_port, None);
        assert!(cfg.seed_locations);
    }
}
