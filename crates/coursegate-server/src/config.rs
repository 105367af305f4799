//! Process configuration read from `COURSEGATE_*` environment variables.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use coursegate_auth::config::{AuthConfig, SchedulerConfig};
use coursegate_db::DbConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("missing required setting {0}")]
    Missing(String),

    #[error("cannot read {key} from {path}: {source}")]
    Io {
        key: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub scheduler: SchedulerConfig,
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    prefix: String,
    vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            prefix: "COURSEGATE".into(),
            vars: vars.into_iter().collect(),
        }
    }

    pub fn load(&self) -> ConfigResult<ServerConfig> {
        let mut config = ServerConfig::default();
        self.apply_db_overrides(&mut config.db);
        self.apply_auth_overrides(&mut config.auth)?;
        self.apply_scheduler_overrides(&mut config.scheduler)?;
        Ok(config)
    }

    fn apply_db_overrides(&self, db: &mut DbConfig) {
        if let Some(url) = self.get("DB_URL") {
            db.url = url.to_owned();
        }
        if let Some(ns) = self.get("DB_NAMESPACE") {
            db.namespace = ns.to_owned();
        }
        if let Some(name) = self.get("DB_DATABASE") {
            db.database = name.to_owned();
        }
        if let Some(user) = self.get("DB_USERNAME") {
            db.username = user.to_owned();
        }
        if let Some(pass) = self.get("DB_PASSWORD") {
            db.password = pass.to_owned();
        }
    }

    fn apply_auth_overrides(&self, auth: &mut AuthConfig) -> ConfigResult<()> {
        auth.jwt_private_key_pem = self.pem("JWT_PRIVATE_KEY")?;
        auth.jwt_public_key_pem = self.pem("JWT_PUBLIC_KEY")?;

        if let Some(issuer) = self.get("JWT_ISSUER") {
            auth.jwt_issuer = issuer.to_owned();
        }
        if let Some(pepper) = self.get("PASSWORD_PEPPER") {
            auth.pepper = Some(pepper.to_owned());
        }
        self.parse_into("ACCESS_TOKEN_LIFETIME_SECS", &mut auth.access_token_lifetime_secs)?;
        self.parse_into("MIN_PASSWORD_LENGTH", &mut auth.min_password_length)?;
        self.parse_into("ARGON2_MEMORY_KIB", &mut auth.argon2_memory_kib)?;
        self.parse_into("ARGON2_ITERATIONS", &mut auth.argon2_iterations)?;
        self.parse_into("ARGON2_PARALLELISM", &mut auth.argon2_parallelism)?;
        self.parse_into("INACTIVITY_TIMEOUT_SECS", &mut auth.inactivity_timeout_secs)?;
        self.parse_into("IDLE_CLEANUP_THRESHOLD_SECS", &mut auth.idle_cleanup_threshold_secs)?;
        self.parse_into("ENTITLEMENT_DAYS", &mut auth.default_entitlement_days)?;
        self.parse_into("EXTENSION_MONTHS", &mut auth.default_extension_months)?;

        if auth.inactivity_timeout_secs == 0 {
            return Err(self.invalid("INACTIVITY_TIMEOUT_SECS", "must be positive"));
        }
        if auth.default_entitlement_days == 0 {
            return Err(self.invalid("ENTITLEMENT_DAYS", "must be positive"));
        }
        if auth.default_extension_months == 0 {
            return Err(self.invalid("EXTENSION_MONTHS", "must be positive"));
        }
        Ok(())
    }

    fn apply_scheduler_overrides(&self, scheduler: &mut SchedulerConfig) -> ConfigResult<()> {
        self.secs_into("SWEEP_INTERVAL_SECS", &mut scheduler.sweep_interval)?;
        self.secs_into("WARNING_INTERVAL_SECS", &mut scheduler.warning_interval)?;
        self.secs_into(
            "SESSION_CLEANUP_INTERVAL_SECS",
            &mut scheduler.session_cleanup_interval,
        )?;
        self.parse_into("URGENT_WINDOW_DAYS", &mut scheduler.urgent_window_days)?;
        self.parse_into("UPCOMING_WINDOW_DAYS", &mut scheduler.upcoming_window_days)?;
        self.parse_into("SCAN_PAGE_SIZE", &mut scheduler.page_size)?;

        if scheduler.page_size == 0 {
            return Err(self.invalid("SCAN_PAGE_SIZE", "must be positive"));
        }
        if scheduler.urgent_window_days > scheduler.upcoming_window_days {
            return Err(self.invalid(
                "URGENT_WINDOW_DAYS",
                "must not exceed UPCOMING_WINDOW_DAYS",
            ));
        }
        Ok(())
    }

    /// A PEM either inline (`<KEY>`) or read from a file (`<KEY>_FILE`).
    fn pem(&self, name: &str) -> ConfigResult<String> {
        if let Some(inline) = self.get(name) {
            return Ok(inline.to_owned());
        }
        let file_key = format!("{name}_FILE");
        match self.get(&file_key) {
            Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                key: self.key(&file_key),
                path: path.to_owned(),
                source,
            }),
            None => Err(ConfigError::Missing(self.key(name))),
        }
    }

    fn parse_into<T>(&self, name: &str, slot: &mut T) -> ConfigResult<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(raw) = self.get(name) {
            *slot = raw
                .trim()
                .parse()
                .map_err(|e: T::Err| self.invalid(name, e))?;
        }
        Ok(())
    }

    fn secs_into(&self, name: &str, slot: &mut Duration) -> ConfigResult<()> {
        let mut secs = slot.as_secs();
        self.parse_into(name, &mut secs)?;
        if secs == 0 {
            return Err(self.invalid(name, "must be positive"));
        }
        *slot = Duration::from_secs(secs);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(&self.key(name)).map(String::as_str)
    }

    fn key(&self, name: &str) -> String {
        format!("{}_{name}", self.prefix)
    }

    fn invalid(&self, name: &str, message: impl Display) -> ConfigError {
        ConfigError::Invalid {
            key: self.key(name),
            message: message.to_string(),
        }
    }
}
