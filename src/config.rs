use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "SSH")]
    pub ssh: SshConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct SshConfig {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DashboardConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_services")]
    pub services: Vec<String>,
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            services: default_services(),
            fail_fast: false,
        }
    }
}

// Пароль не должен попадать в логи.
impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать TOML в {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ssh(&self.ssh)?;
        validate_dashboard(&self.dashboard)?;
        Ok(())
    }

    pub fn example_toml() -> &'static str {
        include_str!("../config.toml.example")
    }
}

impl SshConfig {
    /// Resolves the password: a non-empty `password_env` variable wins over
    /// the inline `password`.
    pub fn resolve_password(&self) -> Result<String, ConfigError> {
        if let Some(env_name) = &self.password_env {
            if let Ok(v) = std::env::var(env_name) {
                if !v.trim().is_empty() {
                    return Ok(v);
                }
            }
        }
        if let Some(v) = &self.password {
            return Ok(v.clone());
        }

        Err(ConfigError::Validation(match &self.password_env {
            Some(env_name) => format!(
                "не найден пароль SSH: задайте '{}' в окружении или SSH.password в config",
                env_name
            ),
            None => "не найден пароль SSH: задайте SSH.password в config".to_string(),
        }))
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

fn validate_ssh(cfg: &SshConfig) -> Result<(), ConfigError> {
    if cfg.hostname.trim().is_empty() {
        return Err(ConfigError::Validation(
            "поле SSH.hostname обязательно".to_string(),
        ));
    }
    if cfg.port == 0 {
        return Err(ConfigError::Validation(
            "SSH.port должен быть в диапазоне 1..65535".to_string(),
        ));
    }
    if cfg.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "поле SSH.username обязательно".to_string(),
        ));
    }
    if cfg.password.is_none() && cfg.password_env.is_none() {
        return Err(ConfigError::Validation(
            "нужно задать SSH.password или SSH.password_env".to_string(),
        ));
    }
    if cfg.timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "SSH.timeout_ms должен быть > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_dashboard(cfg: &DashboardConfig) -> Result<(), ConfigError> {
    if cfg.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "dashboard.interval_secs должно быть >= 1".to_string(),
        ));
    }
    if cfg.services.is_empty() {
        return Err(ConfigError::Validation(
            "dashboard.services не должен быть пустым".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for name in &cfg.services {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dashboard.services[*] не должен быть пустым".to_string(),
            ));
        }
        // имя подставляется в удалённую команду оболочки
        if !is_valid_unit_name(name) {
            return Err(ConfigError::Validation(format!(
                "имя сервиса '{}' содержит недопустимые символы",
                name
            )));
        }
        if !names.insert(name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "имя сервиса '{}' должно быть уникальным",
                name
            )));
        }
    }
    Ok(())
}

fn is_valid_unit_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | ':' | '-'))
}

const fn default_port() -> u16 {
    22
}

const fn default_interval_secs() -> u64 {
    2
}

fn default_services() -> Vec<String> {
    vec![
        "boxy-ben".to_string(),
        "boxy-flo".to_string(),
        "minecraftserver".to_string(),
    ]
}
