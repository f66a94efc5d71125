use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;

use crate::{
    client::{Credentials, TlsPolicy},
    errors::SettingsError,
};

pub static SETTINGS_FILE: &str = ".commitwatch.json";

const DEFAULT_POOLING_SECS: u64 = 60;

const PREFIX_LEN: usize = "${env:".len();

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{env:[a-zA-Z_][a-zA-Z0-9_]*\}").expect("valid env regex"));

#[derive(Debug, Clone, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub server_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_strict_tls")]
    pub strict_tls: bool,
    /// Seconds between two polls.
    #[serde(default = "default_pooling")]
    pub pooling: u64,
    pub repository: Option<PathBuf>,
}

fn default_strict_tls() -> bool {
    true
}

fn default_pooling() -> u64 {
    DEFAULT_POOLING_SECS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Username,
    Password,
    StrictTls,
    Pooling,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::Username,
        SettingKey::Password,
        SettingKey::StrictTls,
        SettingKey::Pooling,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Password => "password",
            Self::StrictTls => "strictTls",
            Self::Pooling => "pooling",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue<'a> {
    Text(&'a str),
    Flag(bool),
    Seconds(u64),
}

impl std::fmt::Display for SettingValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Flag(b) => write!(f, "{b}"),
            Self::Seconds(secs) => write!(f, "{secs}s"),
        }
    }
}

impl Settings {
    pub fn get(&self, key: SettingKey) -> SettingValue<'_> {
        match key {
            SettingKey::Username => SettingValue::Text(&self.username),
            SettingKey::Password => SettingValue::Text(&self.password),
            SettingKey::StrictTls => SettingValue::Flag(self.strict_tls),
            SettingKey::Pooling => SettingValue::Seconds(self.pooling),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn tls_policy(&self) -> TlsPolicy {
        if self.strict_tls {
            TlsPolicy::Strict
        } else {
            TlsPolicy::AcceptInvalidCerts
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.pooling)
    }

    /// Repository to watch, relative paths resolved against `base`.
    pub fn repository_path(&self, base: &Path) -> PathBuf {
        match &self.repository {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => base.join(p),
            None => base.to_path_buf(),
        }
    }
}

fn substitute_variables(s: &str, replacer: fn(&str) -> Option<String>) -> String {
    let mut res = String::with_capacity(s.len());
    let mut index = 0;
    for m in ENV_VAR.find_iter(s) {
        res.push_str(&s[index..m.start()]);
        index = m.end();
        let m_str = m.as_str();
        let var_name = &m_str[PREFIX_LEN..m_str.len() - 1];
        res.push_str(&replacer(var_name).unwrap_or_default());
    }
    res.push_str(&s[index..]);
    res
}

pub fn env_replacer(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub fn load_settings(
    s: &str,
    replacer: fn(&str) -> Option<String>,
) -> Result<Settings, SettingsError> {
    let sub = substitute_variables(s, replacer);
    let settings = serde_json::from_str::<Settings>(&sub)?;
    if settings.pooling == 0 {
        return Err(SettingsError::InvalidPollingInterval);
    }
    Ok(settings)
}

pub fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SettingsError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            SettingsError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    load_settings(&content, env_replacer)
}

/// `<repo>/.commitwatch.json` when present, `~/.commitwatch.json` otherwise.
pub fn default_settings_path(repo: &Path) -> PathBuf {
    let local = repo.join(SETTINGS_FILE);
    if local.exists() {
        return local;
    }
    match dirs::home_dir() {
        Some(home) => home.join(SETTINGS_FILE),
        None => local,
    }
}
