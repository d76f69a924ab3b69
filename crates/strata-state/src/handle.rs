//! Connection setup for the Strata database.
//!
//! [`ConnectTarget`] names where the database lives; [`SurrealHandle`] is the
//! connected, schema-initialized client every Surreal store is built from.

use std::fmt;
use std::path::PathBuf;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

pub const DEFAULT_NAMESPACE: &str = "strata";
pub const DEFAULT_DATABASE: &str = "main";
/// Used when the environment names no remote database.
pub const DEFAULT_LOCAL_PATH: &str = ".strata/db";

/// Who signs in to a remote database.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Root user, scoped to the whole server.
    Root { username: String, password: String },
    /// User defined on the target namespace/database.
    Database { username: String, password: String },
}

impl Credentials {
    pub fn username(&self) -> &str {
        match self {
            Credentials::Root { username, .. } | Credentials::Database { username, .. } => username,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Credentials::Root { .. })
    }
}

// Never print passwords, not even in debug logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_root() { "Root" } else { "Database" };
        f.debug_struct(kind)
            .field("username", &self.username())
            .field("password", &"***")
            .finish()
    }
}

/// Authenticated remote deployment (SurrealDB Cloud or a self-hosted `wss://` server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub credentials: Credentials,
}

impl CloudConfig {
    /// Database-user login against the default namespace and database.
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: DEFAULT_NAMESPACE.into(),
            database: DEFAULT_DATABASE.into(),
            credentials: Credentials::Database {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self
        }
    }

    pub fn with_database(self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self
        }
    }

    /// Switch between root and database-user login, keeping the same login pair.
    pub fn with_root(self, root: bool) -> Self {
        let (username, password) = match self.credentials {
            Credentials::Root { username, password }
            | Credentials::Database { username, password } => (username, password),
        };
        let credentials = if root {
            Credentials::Root { username, password }
        } else {
            Credentials::Database { username, password }
        };
        Self {
            credentials,
            ..self
        }
    }

    /// Read `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and `SURREALDB_PASSWORD`
    /// (all required) plus the optional `SURREALDB_NAMESPACE`,
    /// `SURREALDB_DATABASE` and `SURREALDB_ROOT=true`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StateError::Connection(format!("{key} not set")))
        };
        let mut config = Self::new(
            required("SURREALDB_ENDPOINT")?,
            required("SURREALDB_USERNAME")?,
            required("SURREALDB_PASSWORD")?,
        );
        if let Some(ns) = lookup("SURREALDB_NAMESPACE") {
            config = config.with_namespace(ns);
        }
        if let Some(db) = lookup("SURREALDB_DATABASE") {
            config = config.with_database(db);
        }
        let root = lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Ok(config.with_root(root))
    }
}

/// Where to open the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Memory,
    /// Any engine URL the `any` engine accepts, connected without signing in.
    Url(String),
    Cloud(CloudConfig),
    /// `surrealkv://` files under this directory, created on connect.
    Local(PathBuf),
}

impl ConnectTarget {
    /// Cloud credentials win over `SURREALDB_URL`; with neither set the
    /// database lives under [`DEFAULT_LOCAL_PATH`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Ok(cloud) = CloudConfig::from_lookup(&lookup) {
            return ConnectTarget::Cloud(cloud);
        }
        match lookup("SURREALDB_URL").filter(|u| !u.is_empty()) {
            Some(url) => ConnectTarget::Url(url),
            None => ConnectTarget::Local(PathBuf::from(DEFAULT_LOCAL_PATH)),
        }
    }

    fn label(&self) -> String {
        match self {
            ConnectTarget::Memory => "mem://".into(),
            ConnectTarget::Url(url) => url.clone(),
            ConnectTarget::Cloud(cloud) => cloud.endpoint.clone(),
            ConnectTarget::Local(path) => format!("surrealkv://{}", path.display()),
        }
    }
}

/// Connected, schema-initialized SurrealDB client.
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    #[instrument(skip_all, fields(target = %target.label()))]
    pub async fn connect(target: ConnectTarget) -> Result<Self> {
        let db = match &target {
            ConnectTarget::Memory | ConnectTarget::Url(_) => {
                let db = open(&target.label()).await?;
                select(&db, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
                db
            }
            ConnectTarget::Local(path) => {
                std::fs::create_dir_all(path).map_err(|e| {
                    StateError::Connection(format!("cannot create {}: {e}", path.display()))
                })?;
                let db = open(&target.label()).await?;
                select(&db, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
                db
            }
            ConnectTarget::Cloud(cloud) => {
                let db = open(&cloud.endpoint).await?;
                sign_in(&db, cloud).await?;
                select(&db, &cloud.namespace, &cloud.database).await?;
                db
            }
        };

        migrations::init_schema(&db)
            .await
            .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
        info!(event = "db.connected", "database ready");
        Ok(Self { db })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(ConnectTarget::Memory).await
    }

    pub async fn connect_url(url: &str) -> Result<Self> {
        Self::connect(ConnectTarget::Url(url.to_string())).await
    }

    pub async fn connect_cloud(config: CloudConfig) -> Result<Self> {
        Self::connect(ConnectTarget::Cloud(config)).await
    }

    pub async fn local(path: impl Into<PathBuf>) -> Result<Self> {
        Self::connect(ConnectTarget::Local(path.into())).await
    }

    /// See [`ConnectTarget::from_env`].
    pub async fn from_env() -> Result<Self> {
        Self::connect(ConnectTarget::from_env()).await
    }

    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}

async fn open(url: &str) -> Result<Surreal<Any>> {
    surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("connect {url}: {e}")))
}

async fn sign_in(db: &Surreal<Any>, cloud: &CloudConfig) -> Result<()> {
    let signed_in = match &cloud.credentials {
        Credentials::Root { username, password } => {
            db.signin(Root { username, password }).await.map(|_| ())
        }
        Credentials::Database { username, password } => db
            .signin(Database {
                namespace: &cloud.namespace,
                database: &cloud.database,
                username,
                password,
            })
            .await
            .map(|_| ()),
    };
    signed_in.map_err(|e| {
        StateError::Connection(format!(
            "sign-in as {} failed: {e}",
            cloud.credentials.username()
        ))
    })
}

async fn select(db: &Surreal<Any>, namespace: &str, database: &str) -> Result<()> {
    db.use_ns(namespace)
        .use_db(database)
        .await
        .map_err(|e| StateError::Connection(format!("use {namespace}/{database}: {e}")))
}
