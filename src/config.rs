use anyhow::{bail, Context};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Store selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Document,
    WideColumn,
    Relational,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" | "mongodb" | "mongo" => Ok(Self::Document),
            "wide-column" | "wide_column" | "scylla" | "scylladb" | "cassandra" => Ok(Self::WideColumn),
            "relational" | "cockroach" | "cockroachdb" | "postgres" => Ok(Self::Relational),
            other => bail!("unknown PROFILE_BACKEND `{}`", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct WideColumnConfig {
    pub nodes: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u32,
}

#[derive(Debug, Clone)]
pub struct RelationalConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub document: DocumentStoreConfig,
    pub wide_column: WideColumnConfig,
    pub relational: RelationalConfig,
    pub connect_timeout: Duration,
    pub store_timeout: Duration,
    pub images_dir: PathBuf,
    pub pages_dir: PathBuf,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}=`{}`", key, raw)),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let backend = parse_or(&lookup, "PROFILE_BACKEND", Backend::Relational)?;

        let document = DocumentStoreConfig {
            uri: var("MONGODB_URI", "mongodb://mongodb:27017"),
            database: var("MONGODB_DATABASE", "goDatabaseCrud"),
            collection: var("MONGODB_COLLECTION", "users"),
        };

        let nodes: Vec<String> = var("SCYLLA_NODES", "scylla:9042")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if nodes.is_empty() {
            bail!("SCYLLA_NODES must name at least one node");
        }
        let keyspace = var("SCYLLA_KEYSPACE", "catalog");
        if !keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("SCYLLA_KEYSPACE `{}` is not a plain identifier", keyspace);
        }
        let wide_column = WideColumnConfig {
            nodes,
            keyspace,
            replication_factor: parse_or(&lookup, "SCYLLA_REPLICATION_FACTOR", 1)?,
        };

        let relational = RelationalConfig {
            database_url: var(
                "DATABASE_URL",
                "postgres://root@cockroach:26257/catalog?sslmode=disable",
            ),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
        };

        Ok(Self {
            backend,
            host: var("APP_HOST", "0.0.0.0"),
            port: parse_or(&lookup, "APP_PORT", 8080)?,
            document,
            wide_column,
            relational,
            connect_timeout: Duration::from_secs(parse_or(&lookup, "STORE_CONNECT_TIMEOUT_SECS", 10)?),
            store_timeout: Duration::from_secs(parse_or(&lookup, "STORE_REQUEST_TIMEOUT_SECS", 5)?),
            images_dir: PathBuf::from(var("IMAGES_DIR", "images")),
            pages_dir: PathBuf::from(var("HTML_PAGES_DIR", "html_pages")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.backend, Backend::Relational);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.wide_column.nodes, vec!["scylla:9042"]);
        assert_eq!(cfg.wide_column.keyspace, "catalog");
        assert_eq!(cfg.document.collection, "users");
        assert_eq!(cfg.store_timeout, Duration::from_secs(5));
        assert_eq!(cfg.images_dir, PathBuf::from("images"));
        assert_eq!(cfg.pages_dir, PathBuf::from("html_pages"));
    }

    #[test]
    fn backend_aliases() {
        assert_eq!("mongodb".parse::<Backend>().unwrap(), Backend::Document);
        assert_eq!("Scylla".parse::<Backend>().unwrap(), Backend::WideColumn);
        assert_eq!("cockroach".parse::<Backend>().unwrap(), Backend::Relational);
        assert!("redis".parse::<Backend>().is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("PROFILE_BACKEND", "wide-column"),
            ("SCYLLA_NODES", "n1:9042, n2:9042"),
            ("APP_PORT", "9000"),
            ("STORE_REQUEST_TIMEOUT_SECS", "2"),
        ])
        .unwrap();
        assert_eq!(cfg.backend, Backend::WideColumn);
        assert_eq!(cfg.wide_column.nodes, vec!["n1:9042", "n2:9042"]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.store_timeout, Duration::from_secs(2));
    }

    #[test]
    fn bad_values_fail_startup() {
        assert!(config(&[("APP_PORT", "eighty")]).is_err());
        assert!(config(&[("PROFILE_BACKEND", "sqlite")]).is_err());
        assert!(config(&[("SCYLLA_KEYSPACE", "cat; DROP")]).is_err());
        assert!(config(&[("SCYLLA_NODES", " , ")]).is_err());
    }
}
