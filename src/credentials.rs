//! Credential source: the API key and permission list, read fresh per request
//!
//! The relay never caches either value: the user may save a new key or
//! change permissions between two submissions.

use crate::config::{defaults::PERMISSION_NAMESPACE, CredentialsConfig};
use std::sync::RwLock;
use tracing::info;

/// Where the relay reads the current API key and permission list from.
pub trait CredentialSource: Send + Sync {
    /// Current API key, `None` when absent or blank.
    fn api_key(&self) -> Option<String>;

    /// Current comma-separated permission list, `None` when absent or blank.
    fn permissions(&self) -> Option<String>;
}

#[derive(Debug, Default, Clone)]
struct Settings {
    api_key: Option<String>,
    permissions: Option<String>,
}

/// In-memory settings store standing in for the host's key-value config.
#[derive(Debug, Default)]
pub struct SettingsStore {
    inner: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from the `[credentials]` config section.
    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self {
            inner: RwLock::new(Settings {
                api_key: normalize(config.api_key.as_deref()),
                permissions: normalize(config.permissions.as_deref()),
            }),
        }
    }

    pub fn set_api_key(&self, key: &str) {
        self.write(|s| s.api_key = normalize(Some(key)));
        info!("EDStS API key saved");
    }

    pub fn clear_api_key(&self) {
        self.write(|s| s.api_key = None);
        info!("EDStS API key cleared");
    }

    pub fn set_permissions(&self, permissions: &str) {
        self.write(|s| s.permissions = normalize(Some(permissions)));
    }

    fn write(&self, f: impl FnOnce(&mut Settings)) {
        // A poisoned lock still holds plain strings; keep using them.
        let mut guard = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard);
    }

    fn read(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl CredentialSource for SettingsStore {
    fn api_key(&self) -> Option<String> {
        self.read().api_key
    }

    fn permissions(&self) -> Option<String> {
        self.read().permissions
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Serialize a permission list into the `x-permissions` header value.
///
/// `"EDStS"` when nothing is configured, otherwise `"EDStS,p1,p2"` with
/// entries trimmed and empty entries dropped.
pub fn permissions_header(permissions: Option<&str>) -> String {
    let perms: Vec<&str> = permissions
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if perms.is_empty() {
        PERMISSION_NAMESPACE.to_string()
    } else {
        format!("{},{}", PERMISSION_NAMESPACE, perms.join(","))
    }
}
