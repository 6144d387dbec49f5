use crate::error::{Result, TimberlineError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Span;

/// Environment variable naming a YAML file to load settings from.
pub const YAML_ENV_VAR: &str = "TIMBERLINE_YAML";

/// File looked up under `<framework root>/config/`.
pub const CONFIG_FILE_NAME: &str = "timberline.yaml";

/// Settings for reaching the backing store.
///
/// Every field is optional and nothing is defaulted here: whatever was not
/// set explicitly or found in a YAML source stays `None`, and the store
/// adapter decides what to do about it.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<Duration>,
    pub password: Option<String>,
    pub database: Option<i64>,
    /// Span the queue handle instruments store calls with.
    pub logger: Option<Span>,
    /// Prefix applied to every key this crate writes.
    pub namespace: Option<String>,
}

/// Connection parameters in the shape the store adapter expects.
#[derive(Debug, Clone, Default)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<Duration>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub logger: Option<Span>,
}

/// Keys recognised in a YAML config file. Anything else is ignored.
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    host: Option<String>,
    port: Option<u16>,
    /// Seconds
    timeout: Option<f64>,
    password: Option<String>,
    database: Option<i64>,
    namespace: Option<String>,
}

impl Config {
    /// An empty configuration. No file or environment variable is consulted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a configuration from the environment alone: the file named
    /// by `TIMBERLINE_YAML` if that variable is set, otherwise nothing.
    ///
    /// # Errors
    ///
    /// [`TimberlineError::ConfigLoad`] if the variable names a file that is
    /// missing or not valid YAML.
    pub fn load() -> Result<Self> {
        ConfigBuilder::new().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Reads `path` and fills every field that is still unset. Fields that
    /// already hold a value keep it.
    ///
    /// # Errors
    ///
    /// [`TimberlineError::ConfigLoad`] if the file does not exist, cannot be
    /// read or does not parse.
    pub fn load_from_yaml(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let load_error = |reason: String| TimberlineError::ConfigLoad {
            path: path.display().to_string(),
            reason,
        };

        if !path.exists() {
            return Err(load_error("file does not exist".to_string()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| load_error(format!("failed to read file: {}", e)))?;
        let yaml: YamlConfig = if contents.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|e| load_error(format!("invalid YAML: {}", e)))?
        };

        let timeout = yaml
            .timeout
            .map(Duration::try_from_secs_f64)
            .transpose()
            .map_err(|e| load_error(format!("invalid timeout: {}", e)))?;

        tracing::debug!(path = %path.display(), "Loaded timberline configuration");

        fill(&mut self.host, yaml.host);
        fill(&mut self.port, yaml.port);
        fill(&mut self.timeout, timeout);
        fill(&mut self.password, yaml.password);
        fill(&mut self.database, yaml.database);
        fill(&mut self.namespace, yaml.namespace);
        Ok(())
    }

    /// Translates the resolved settings into store connection parameters.
    /// `database` becomes `db`; unset fields stay unset.
    pub fn redis_config(&self) -> ConnectionParams {
        ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            timeout: self.timeout,
            password: self.password.clone(),
            db: self.database,
            logger: self.logger.clone(),
        }
    }
}

fn fill<T>(field: &mut Option<T>, value: Option<T>) {
    if field.is_none() {
        *field = value;
    }
}

/// Looks for `<root>/config/timberline.yaml`, returning the path only if the
/// file exists.
pub fn discover_framework_config(root: impl AsRef<Path>) -> Option<PathBuf> {
    let candidate = root.as_ref().join("config").join(CONFIG_FILE_NAME);
    candidate.is_file().then_some(candidate)
}

/// Builds a [`Config`], applying sources in order of precedence:
///
/// 1. values set on the builder
/// 2. the file given to [`yaml_file`](Self::yaml_file)
/// 3. the file named by `TIMBERLINE_YAML`
/// 4. `config/timberline.yaml` under [`framework_root`](Self::framework_root), if present
///
/// Only the first applicable YAML source is read, and it only fills fields
/// the builder left unset.
///
/// # Examples
///
/// ```no_run
/// use timberline::ConfigBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), timberline::TimberlineError> {
/// let config = ConfigBuilder::new()
///     .database(15)
///     .timeout(Duration::from_secs(5))
///     .framework_root("/srv/app")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
    yaml_file: Option<PathBuf>,
    framework_root: Option<PathBuf>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout = Some(Duration::from_secs(secs));
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: i64) -> Self {
        self.config.database = Some(database);
        self
    }

    pub fn logger(mut self, span: Span) -> Self {
        self.config.logger = Some(span);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    /// Loads this file; it must exist.
    pub fn yaml_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.yaml_file = Some(path.into());
        self
    }

    /// Root directory of a host application to search for `config/timberline.yaml`.
    pub fn framework_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.framework_root = Some(root.into());
        self
    }

    /// Resolves the configuration.
    ///
    /// # Errors
    ///
    /// [`TimberlineError::ConfigLoad`] when an explicitly named file (through
    /// [`yaml_file`](Self::yaml_file) or `TIMBERLINE_YAML`) is missing or
    /// invalid. A missing framework file is not an error.
    pub fn build(self) -> Result<Config> {
        let mut config = self.config;

        let source = match self.yaml_file {
            Some(path) => Some(path),
            None => match std::env::var_os(YAML_ENV_VAR) {
                Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
                _ => self.framework_root.and_then(|root| {
                    let found = discover_framework_config(&root);
                    if found.is_none() {
                        tracing::debug!(
                            root = %root.display(),
                            "No timberline.yaml under framework root"
                        );
                    }
                    found
                }),
            },
        };

        if let Some(path) = source {
            config.load_from_yaml(&path)?;
        }
        Ok(config)
    }
}
