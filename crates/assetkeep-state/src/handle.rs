//! SurrealDB connection setup
//!
//! [`StoreLocation`] says where the entity store lives; [`connect`] opens it,
//! selects the namespace/database and runs migrations.

use std::path::PathBuf;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

const DEFAULT_NAMESPACE: &str = "assetkeep";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".assetkeep/db";

/// Credentials for an authenticated (usually remote, `wss://`) server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Sign in as a root user instead of a database user.
    pub is_root: bool,
}

impl CloudConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// `None` unless endpoint, username and password are all present.
    fn from_lookup<F>(lookup: &F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            lookup("SURREALDB_ENDPOINT")?,
            lookup("SURREALDB_USERNAME")?,
            lookup("SURREALDB_PASSWORD")?,
        );
        if let Some(ns) = lookup("SURREALDB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Some(db) = lookup("SURREALDB_DATABASE") {
            config.database = db;
        }
        config.is_root = lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Some(config)
    }
}

/// Where the entity store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Process-local, lost on exit.
    Memory,
    /// Any URL the `any` engine understands, unauthenticated.
    Url(String),
    /// Authenticated server.
    Cloud(CloudConfig),
    /// SurrealKV files under a local directory.
    Local(PathBuf),
}

impl StoreLocation {
    /// Resolve from the environment, first match wins:
    ///
    /// 1. `SURREALDB_ENDPOINT` + `SURREALDB_USERNAME` + `SURREALDB_PASSWORD`
    ///    (with optional `SURREALDB_NAMESPACE`, `SURREALDB_DATABASE`,
    ///    `SURREALDB_ROOT`)
    /// 2. `SURREALDB_URL`
    /// 3. `.assetkeep/db` in the working directory
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(config) = CloudConfig::from_lookup(&lookup) {
            return StoreLocation::Cloud(config);
        }
        if let Some(url) = lookup("SURREALDB_URL") {
            return StoreLocation::Url(url);
        }
        StoreLocation::Local(PathBuf::from(LOCAL_DB_PATH))
    }
}

/// Open the store at `location` and bring its schema up to date.
#[instrument(skip_all)]
pub async fn connect(location: &StoreLocation) -> Result<Surreal<Any>> {
    match location {
        StoreLocation::Memory => connect_url("mem://").await,
        StoreLocation::Url(url) => connect_url(url).await,
        StoreLocation::Cloud(config) => connect_cloud(config).await,
        StoreLocation::Local(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                StateError::Connection(format!("cannot create {}: {e}", dir.display()))
            })?;
            connect_url(&format!("surrealkv://{}", dir.display())).await
        }
    }
}

/// Connect to `url` without credentials.
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    info!(url = %url, "connecting to entity store");
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("{url}: {e}")))?;
    select_and_migrate(db, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
}

/// Connect and sign in with `config`.
#[instrument(skip(config), fields(endpoint = %config.endpoint, root = config.is_root))]
pub async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| StateError::Connection(format!("{}: {e}", config.endpoint)))?;

    let signin = if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
    };
    signin.map_err(|e| StateError::Connection(format!("sign-in failed: {e}")))?;

    select_and_migrate(db, &config.namespace, &config.database).await
}

/// Open the store named by the environment. See [`StoreLocation::from_env`].
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    connect(&StoreLocation::from_env()).await
}

async fn select_and_migrate(db: Surreal<Any>, ns: &str, database: &str) -> Result<Surreal<Any>> {
    db.use_ns(ns)
        .use_db(database)
        .await
        .map_err(|e| StateError::Connection(format!("cannot select {ns}/{database}: {e}")))?;
    migrations::init_schema(&db).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn falls_back_to_local_directory() {
        assert_eq!(
            StoreLocation::from_lookup(env(&[])),
            StoreLocation::Local(PathBuf::from(".assetkeep/db"))
        );
    }

    #[test]
    fn url_used_when_no_credentials() {
        let location = StoreLocation::from_lookup(env(&[
            ("SURREALDB_URL", "ws://db:8000"),
            ("SURREALDB_USERNAME", "only-half"),
        ]));
        assert_eq!(location, StoreLocation::Url("ws://db:8000".to_string()));
    }

    #[test]
    fn credentials_win_over_url() {
        let location = StoreLocation::from_lookup(env(&[
            ("SURREALDB_URL", "ws://db:8000"),
            ("SURREALDB_ENDPOINT", "wss://cloud"),
            ("SURREALDB_USERNAME", "u"),
            ("SURREALDB_PASSWORD", "p"),
            ("SURREALDB_ROOT", "TRUE"),
        ]));
        let StoreLocation::Cloud(config) = location else {
            panic!("expected cloud location");
        };
        assert_eq!(config.endpoint, "wss://cloud");
        assert_eq!(config.namespace, "assetkeep");
        assert_eq!(config.database, "main");
        assert!(config.is_root);
    }

    #[tokio::test]
    async fn memory_location_is_migrated() {
        let db = connect(&StoreLocation::Memory).await.unwrap();
        let mut res = db.query("SELECT * FROM assets").await.unwrap();
        let rows: Vec<crate::schema::AssetRow> = res.take(0).unwrap();
        assert!(rows.is_empty());
    }
}
