//! Mount configuration.
//!
//! The full configuration schema recognized by the mount binary, loadable
//! from YAML and overridable from the command line. Validation happens once,
//! before anything touches the network or the mountpoint.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::instance::instance_id;
use crate::path::normalize_path;

/// Default iRODS port.
pub const PORT_DEFAULT: u16 = 1247;
/// Default data transfer block size (16 MiB).
pub const BLOCK_SIZE_DEFAULT: usize = 16 * 1024 * 1024;
/// Default read-ahead budget in bytes.
pub const READ_AHEAD_MAX_DEFAULT: usize = 2 * BLOCK_SIZE_DEFAULT;
/// Default maximum number of backend connections.
pub const CONNECTION_MAX_DEFAULT: usize = 10;
/// Default per-operation timeout.
pub const OPERATION_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5 * 60);
/// Default backend connection lifespan.
pub const CONNECTION_LIFESPAN_DEFAULT: Duration = Duration::from_secs(60 * 60);
/// Default idle connection timeout.
pub const CONNECTION_IDLE_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5 * 60);
/// Default metadata cache entry TTL.
pub const METADATA_CACHE_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5 * 60);
/// Default metadata cache cleanup cadence.
pub const METADATA_CACHE_CLEANUP_TIME_DEFAULT: Duration = Duration::from_secs(5 * 60);

/// Native (password) authentication scheme.
pub const AUTH_SCHEME_NATIVE: &str = "native";
/// PAM authentication scheme; requires the SSL settings.
pub const AUTH_SCHEME_PAM: &str = "pam";

const CS_NEGOTIATION_POLICY_DEFAULT: &str = "CS_NEG_REFUSE";
const ENCRYPTION_KEY_SIZE_DEFAULT: usize = 32;
const ENCRYPTION_ALGORITHM_DEFAULT: &str = "AES-256-CBC";
const SALT_SIZE_DEFAULT: usize = 8;
const HASH_ROUNDS_DEFAULT: usize = 16;
const PROFILE_SERVICE_PORT_DEFAULT: u16 = 11021;

/// Default prefix of extended attributes reserved for internal use.
pub const XATTR_INTERNAL_PREFIX_DEFAULT: &str = "irodsfuse.";

/// Errors produced by configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field is missing or a field value is out of range.
    #[error("invalid configuration: {message}")]
    Invalid { message: String },

    /// The YAML document could not be parsed.
    #[error("failed to parse configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A filesystem check on a configured path failed.
    #[error("configuration path error for {path}: {message}")]
    PathError { path: String, message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// One configured mapping from a remote zone path into the mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Absolute path of the collection or data object in the zone.
    pub remote_path: String,
    /// Absolute mount-relative path the remote tree appears under.
    pub local_prefix: String,
    /// Reject every write through this mapping.
    #[serde(default)]
    pub read_only: bool,
    /// Create the remote collection at mount if it does not exist.
    #[serde(default)]
    pub create_on_missing: bool,
}

impl PathMapping {
    /// Create a read-write mapping.
    ///
    /// # Arguments
    /// * `remote_path` - Absolute zone path
    /// * `local_prefix` - Absolute mount-relative prefix
    pub fn new(remote_path: impl Into<String>, local_prefix: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            local_prefix: local_prefix.into(),
            read_only: false,
            create_on_missing: false,
        }
    }

    /// Mark this mapping read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Per-path metadata cache TTL override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataCacheTimeoutSetting {
    /// Absolute zone path the override applies to.
    pub path: String,
    /// TTL for entries at (and optionally below) the path.
    #[serde(with = "crate::duration")]
    pub timeout: Duration,
    /// Apply the override to descendants as well.
    #[serde(default)]
    pub inherit: bool,
}

/// Full mount configuration.
///
/// Field names match the YAML schema; durations are written as strings
/// (`300ms`, `5m`, `1h`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub proxy_user: String,
    pub client_user: String,
    pub zone: String,
    pub password: String,
    pub resource: String,
    pub path_mappings: Vec<PathMapping>,
    pub no_permission_check: bool,
    pub uid: u32,
    pub gid: u32,
    pub system_user: String,
    pub mount_path: String,

    pub data_root_path: String,
    pub log_path: String,
    pub pool_endpoint: String,

    pub authscheme: String,
    pub cs_negotiation: bool,
    pub cs_negotiation_policy: String,
    pub ssl_ca_cert_file: String,
    pub ssl_encryption_key_size: usize,
    pub ssl_encryption_algorithm: String,
    pub ssl_encryption_salt_size: usize,
    pub ssl_encryption_hash_rounds: usize,

    pub block_size: usize,
    pub read_ahead_max: usize,
    #[serde(with = "crate::duration")]
    pub operation_timeout: Duration,
    #[serde(with = "crate::duration")]
    pub connection_lifespan: Duration,
    #[serde(with = "crate::duration")]
    pub connection_idle_timeout: Duration,
    pub connection_max: usize,
    #[serde(with = "crate::duration")]
    pub metadata_cache_timeout: Duration,
    #[serde(with = "crate::duration")]
    pub metadata_cache_cleanup_time: Duration,
    pub metadata_cache_timeout_settings: Vec<MetadataCacheTimeoutSetting>,
    pub start_new_transaction: bool,
    pub invalidate_parent_entry_cache_immediately: bool,

    pub monitor_url: String,
    pub profile: bool,
    pub profile_service_port: u16,

    pub foreground: bool,
    pub debug: bool,
    pub allow_other: bool,
    pub childprocess: bool,

    /// Acknowledge chmod/chown/utimes without applying them (see Setattr).
    pub strict_setattr: bool,
    /// Extended attributes under this prefix are hidden from callers.
    pub xattr_internal_prefix: String,

    pub instanceid: String,
    pub fuse_options: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: PORT_DEFAULT,
            proxy_user: String::new(),
            client_user: String::new(),
            zone: String::new(),
            password: String::new(),
            resource: String::new(),
            path_mappings: Vec::new(),
            no_permission_check: false,
            uid: current_uid(),
            gid: current_gid(),
            system_user: String::new(),
            mount_path: String::new(),

            data_root_path: default_data_root(),
            log_path: String::new(),
            pool_endpoint: String::new(),

            authscheme: AUTH_SCHEME_NATIVE.to_string(),
            cs_negotiation: false,
            cs_negotiation_policy: CS_NEGOTIATION_POLICY_DEFAULT.to_string(),
            ssl_ca_cert_file: String::new(),
            ssl_encryption_key_size: ENCRYPTION_KEY_SIZE_DEFAULT,
            ssl_encryption_algorithm: ENCRYPTION_ALGORITHM_DEFAULT.to_string(),
            ssl_encryption_salt_size: SALT_SIZE_DEFAULT,
            ssl_encryption_hash_rounds: HASH_ROUNDS_DEFAULT,

            block_size: BLOCK_SIZE_DEFAULT,
            read_ahead_max: READ_AHEAD_MAX_DEFAULT,
            operation_timeout: OPERATION_TIMEOUT_DEFAULT,
            connection_lifespan: CONNECTION_LIFESPAN_DEFAULT,
            connection_idle_timeout: CONNECTION_IDLE_TIMEOUT_DEFAULT,
            connection_max: CONNECTION_MAX_DEFAULT,
            metadata_cache_timeout: METADATA_CACHE_TIMEOUT_DEFAULT,
            metadata_cache_cleanup_time: METADATA_CACHE_CLEANUP_TIME_DEFAULT,
            metadata_cache_timeout_settings: Vec::new(),
            start_new_transaction: true,
            invalidate_parent_entry_cache_immediately: false,

            monitor_url: String::new(),
            profile: false,
            profile_service_port: PROFILE_SERVICE_PORT_DEFAULT,

            foreground: false,
            debug: false,
            allow_other: false,
            childprocess: false,

            strict_setattr: false,
            xattr_internal_prefix: XATTR_INTERNAL_PREFIX_DEFAULT.to_string(),

            instanceid: instance_id().to_string(),
            fuse_options: Vec::new(),
        }
    }
}

impl Config {
    /// Load a configuration from YAML bytes, applying defaults for
    /// unspecified fields.
    ///
    /// # Arguments
    /// * `yaml` - YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Path of the log file (`<data_root>/<instance_id>.log` unless
    /// overridden).
    pub fn log_file_path(&self) -> PathBuf {
        if !self.log_path.is_empty() {
            return PathBuf::from(&self.log_path);
        }
        PathBuf::from(&self.data_root_path).join(format!("{}.log", self.instanceid))
    }

    /// Per-instance working directory (`<data_root>/<instance_id>`).
    pub fn instance_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_root_path).join(&self.instanceid)
    }

    /// Per-instance temp directory (`<data_root>/<instance_id>/temp`).
    pub fn temp_dir(&self) -> PathBuf {
        self.instance_data_dir().join("temp")
    }

    /// Create the per-instance working directories.
    pub fn make_work_dirs(&self) -> Result<(), ConfigError> {
        let temp: PathBuf = self.temp_dir();
        std::fs::create_dir_all(&temp).map_err(|e| ConfigError::PathError {
            path: temp.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Remove the per-instance working directories at clean shutdown.
    pub fn clean_work_dirs(&self) -> Result<(), ConfigError> {
        let dir: PathBuf = self.instance_data_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| ConfigError::PathError {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Checks required fields, value ranges, path-mapping invariants, the
    /// PAM/SSL requirements, the mountpoint, and the pool endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::invalid("hostname must be given"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("port must be given"));
        }
        if self.proxy_user.is_empty() {
            return Err(ConfigError::invalid("proxy user must be given"));
        }
        if self.client_user.is_empty() {
            return Err(ConfigError::invalid("client user must be given"));
        }
        if self.zone.is_empty() {
            return Err(ConfigError::invalid("zone must be given"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::invalid("password must be given"));
        }
        if self.mount_path.is_empty() {
            return Err(ConfigError::invalid("mount path must be given"));
        }
        if self.data_root_path.is_empty() {
            return Err(ConfigError::invalid("data root path must be given"));
        }
        if self.path_mappings.is_empty() {
            return Err(ConfigError::invalid("path mappings must be given"));
        }

        validate_path_mappings(&self.path_mappings)?;

        if self.block_size == 0 {
            return Err(ConfigError::invalid("block size must be at least 1"));
        }
        if self.connection_max < 1 {
            return Err(ConfigError::invalid(
                "connection max must be equal or greater than 1",
            ));
        }

        if self.profile && self.profile_service_port == 0 {
            return Err(ConfigError::invalid("profile service port must be given"));
        }

        self.validate_mountpoint()?;
        self.validate_auth_scheme()?;

        if !self.pool_endpoint.is_empty() {
            parse_pool_service_endpoint(&self.pool_endpoint)?;
        }

        Ok(())
    }

    fn validate_mountpoint(&self) -> Result<(), ConfigError> {
        let mount: &Path = Path::new(&self.mount_path);
        let metadata: std::fs::Metadata =
            std::fs::metadata(mount).map_err(|e| ConfigError::PathError {
                path: self.mount_path.clone(),
                message: format!("mountpoint error: {}", e),
            })?;

        if !metadata.is_dir() {
            return Err(ConfigError::invalid(format!(
                "mountpoint ({}) must be a directory",
                self.mount_path
            )));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o200 != 0o200 {
                return Err(ConfigError::invalid(format!(
                    "mountpoint ({}) must have write permission",
                    self.mount_path
                )));
            }
        }

        Ok(())
    }

    fn validate_auth_scheme(&self) -> Result<(), ConfigError> {
        match self.authscheme.as_str() {
            AUTH_SCHEME_NATIVE => {}
            AUTH_SCHEME_PAM => {
                if !Path::new(&self.ssl_ca_cert_file).exists() {
                    return Err(ConfigError::invalid(format!(
                        "SSL CA certificate file ({}) does not exist",
                        self.ssl_ca_cert_file
                    )));
                }
                if self.ssl_encryption_key_size == 0 {
                    return Err(ConfigError::invalid("SSL encryption key size must be given"));
                }
                if self.ssl_encryption_algorithm.is_empty() {
                    return Err(ConfigError::invalid("SSL encryption algorithm must be given"));
                }
                if self.ssl_encryption_salt_size == 0 {
                    return Err(ConfigError::invalid("SSL salt size must be given"));
                }
                if self.ssl_encryption_hash_rounds == 0 {
                    return Err(ConfigError::invalid("SSL hash rounds must be given"));
                }
            }
            other => {
                return Err(ConfigError::invalid(format!("unknown auth scheme: {}", other)));
            }
        }

        if self.cs_negotiation && self.cs_negotiation_policy.is_empty() {
            return Err(ConfigError::invalid("CS negotiation policy must be given"));
        }

        Ok(())
    }
}

/// Validate a path-mapping list: absolute paths, unique local prefixes.
///
/// # Arguments
/// * `mappings` - Mappings to validate
pub fn validate_path_mappings(mappings: &[PathMapping]) -> Result<(), ConfigError> {
    let mut seen: Vec<String> = Vec::new();

    for mapping in mappings {
        if !mapping.remote_path.starts_with('/') {
            return Err(ConfigError::invalid(format!(
                "remote path ({}) must be absolute",
                mapping.remote_path
            )));
        }
        if !mapping.local_prefix.starts_with('/') {
            return Err(ConfigError::invalid(format!(
                "local prefix ({}) must be absolute",
                mapping.local_prefix
            )));
        }

        let normalized: String = normalize_path(&mapping.local_prefix);
        if seen.contains(&normalized) {
            return Err(ConfigError::invalid(format!(
                "duplicate local prefix: {}",
                normalized
            )));
        }
        seen.push(normalized);
    }

    Ok(())
}

// ============================================================================
// Pool service endpoint
// ============================================================================

/// Parsed pool service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolServiceEndpoint {
    /// TCP endpoint (`tcp://host:port`).
    Tcp { address: String },
    /// Unix domain socket endpoint (`unix:///path`).
    Unix { path: String },
}

impl fmt::Display for PoolServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { address } => write!(f, "tcp://{}", address),
            Self::Unix { path } => write!(f, "unix://{}", path),
        }
    }
}

/// Parse a pool service endpoint string.
///
/// Accepts `tcp://host:port`, `unix:///path`, and a bare `host:port`
/// (treated as TCP). Anything else is a validation error.
///
/// # Arguments
/// * `endpoint` - Endpoint string
pub fn parse_pool_service_endpoint(
    endpoint: &str,
) -> Result<PoolServiceEndpoint, ConfigError> {
    // Without an explicit scheme, `Url::parse` would mistake `host:port`
    // for `scheme:path`.
    if endpoint.contains("://") {
        let url: Url = Url::parse(endpoint)
            .map_err(|e| ConfigError::invalid(format!("could not parse endpoint: {}", e)))?;
        match url.scheme() {
            "tcp" => {
                let host: &str = url.host_str().ok_or_else(|| {
                    ConfigError::invalid(format!("endpoint ({}) has no host", endpoint))
                })?;
                let address: String = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                return Ok(PoolServiceEndpoint::Tcp { address });
            }
            "unix" => {
                return Ok(PoolServiceEndpoint::Unix {
                    path: normalize_path(url.path()),
                });
            }
            _ => {
                return Err(ConfigError::invalid(format!(
                    "unsupported endpoint protocol: {}",
                    url.scheme()
                )));
            }
        }
    }

    // bare host:port is treated as TCP
    if let Some((host, port)) = endpoint.rsplit_once(':') {
        if !host.is_empty() && port.chars().all(|c: char| c.is_ascii_digit()) && !port.is_empty()
        {
            return Ok(PoolServiceEndpoint::Tcp {
                address: endpoint.to_string(),
            });
        }
    }

    Err(ConfigError::invalid(format!(
        "could not parse endpoint: {}",
        endpoint
    )))
}

// ============================================================================
// System user defaults
// ============================================================================

fn current_uid() -> u32 {
    #[cfg(unix)]
    unsafe {
        libc::getuid()
    }
    #[cfg(not(unix))]
    0
}

fn current_gid() -> u32 {
    #[cfg(unix)]
    unsafe {
        libc::getgid()
    }
    #[cfg(not(unix))]
    0
}

fn default_data_root() -> String {
    std::env::current_dir()
        .map(|d: PathBuf| d.display().to_string())
        .unwrap_or_else(|_| "/var/lib/irodsfuse".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config(mount: &Path) -> Config {
        Config {
            host: "data.example.org".to_string(),
            proxy_user: "proxy".to_string(),
            client_user: "alice".to_string(),
            zone: "tempZone".to_string(),
            password: "secret".to_string(),
            mount_path: mount.display().to_string(),
            path_mappings: vec![PathMapping::new("/tempZone/home/alice", "/")],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_has_sane_values() {
        let config: Config = Config::default();
        assert_eq!(config.port, PORT_DEFAULT);
        assert_eq!(config.block_size, BLOCK_SIZE_DEFAULT);
        assert_eq!(config.connection_max, CONNECTION_MAX_DEFAULT);
        assert_eq!(config.operation_timeout, OPERATION_TIMEOUT_DEFAULT);
        assert_eq!(config.authscheme, AUTH_SCHEME_NATIVE);
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        let mount: TempDir = TempDir::new().unwrap();
        let config: Config = valid_config(mount.path());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_required_fields() {
        let mount: TempDir = TempDir::new().unwrap();

        for strip in ["host", "proxy_user", "zone", "password", "mappings"] {
            let mut config: Config = valid_config(mount.path());
            match strip {
                "host" => config.host.clear(),
                "proxy_user" => config.proxy_user.clear(),
                "zone" => config.zone.clear(),
                "password" => config.password.clear(),
                _ => config.path_mappings.clear(),
            }
            assert!(config.validate().is_err(), "expected {} to be required", strip);
        }
    }

    #[test]
    fn test_validate_rejects_bad_connection_max() {
        let mount: TempDir = TempDir::new().unwrap();
        let mut config: Config = valid_config(mount.path());
        config.connection_max = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_prefixes() {
        let mount: TempDir = TempDir::new().unwrap();
        let mut config: Config = valid_config(mount.path());
        config.path_mappings = vec![
            PathMapping::new("/tempZone/home/a", "/data"),
            PathMapping::new("/tempZone/home/b", "/data/"),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_pam_requires_ssl_settings() {
        let mount: TempDir = TempDir::new().unwrap();
        let mut config: Config = valid_config(mount.path());
        config.authscheme = AUTH_SCHEME_PAM.to_string();
        config.ssl_ca_cert_file = "/nonexistent/ca.pem".to_string();
        assert!(config.validate().is_err());

        let ca: std::path::PathBuf = mount.path().join("ca.pem");
        std::fs::write(&ca, "cert").unwrap();
        config.ssl_ca_cert_file = ca.display().to_string();
        config.validate().unwrap();

        config.ssl_encryption_key_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml: &str = r#"
host: data.example.org
port: 1247
proxy_user: proxy
client_user: alice
zone: tempZone
password: secret
operation_timeout: 5m
metadata_cache_timeout: 300ms
path_mappings:
  - remote_path: /tempZone/home/alice
    local_prefix: /
    read_only: true
"#;
        let config: Config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.host, "data.example.org");
        assert_eq!(config.operation_timeout, Duration::from_secs(300));
        assert_eq!(config.metadata_cache_timeout, Duration::from_millis(300));
        assert!(config.path_mappings[0].read_only);
        // unspecified fields keep their defaults
        assert_eq!(config.connection_max, CONNECTION_MAX_DEFAULT);
    }

    #[test]
    fn test_pool_endpoint_parsing() {
        assert_eq!(
            parse_pool_service_endpoint("tcp://localhost:11020").unwrap(),
            PoolServiceEndpoint::Tcp {
                address: "localhost:11020".to_string()
            }
        );
        assert_eq!(
            parse_pool_service_endpoint("unix:///tmp/pool.sock").unwrap(),
            PoolServiceEndpoint::Unix {
                path: "/tmp/pool.sock".to_string()
            }
        );
        assert_eq!(
            parse_pool_service_endpoint("localhost:11020").unwrap(),
            PoolServiceEndpoint::Tcp {
                address: "localhost:11020".to_string()
            }
        );
        assert!(parse_pool_service_endpoint("http://x").is_err());
        assert!(parse_pool_service_endpoint("garbage").is_err());
    }

    #[test]
    fn test_pool_endpoint_round_trip() {
        for text in ["tcp://localhost:11020", "unix:///var/run/pool.sock"] {
            let endpoint: PoolServiceEndpoint = parse_pool_service_endpoint(text).unwrap();
            let reparsed: PoolServiceEndpoint =
                parse_pool_service_endpoint(&endpoint.to_string()).unwrap();
            assert_eq!(endpoint, reparsed);
        }
    }

    #[test]
    fn test_work_dir_lifecycle() {
        let root: TempDir = TempDir::new().unwrap();
        let mut config: Config = Config::default();
        config.data_root_path = root.path().display().to_string();

        config.make_work_dirs().unwrap();
        assert!(config.temp_dir().is_dir());

        config.clean_work_dirs().unwrap();
        assert!(!config.instance_data_dir().exists());
    }

    #[test]
    fn test_log_file_path_default_and_override() {
        let mut config: Config = Config::default();
        config.data_root_path = "/var/lib/irodsfuse".to_string();
        let default_path: PathBuf = config.log_file_path();
        assert!(default_path
            .to_string_lossy()
            .starts_with("/var/lib/irodsfuse/"));
        assert!(default_path.to_string_lossy().ends_with(".log"));

        config.log_path = "/tmp/custom.log".to_string();
        assert_eq!(config.log_file_path(), PathBuf::from("/tmp/custom.log"));
    }
}
