//! Cookie storage behind a narrow read/write contract.
//!
//! The sender only ever needs `read(name)` and `write(name, value, options)`.
//! Two stores ship here: a process-local map and a JSON jar on disk so the
//! ID survives between runs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::CookieError;

/// Attributes applied to a cookie write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
}

impl CookieOptions {
    /// Scope the cookie to the site root.
    pub fn root() -> Self {
        Self {
            path: "/".to_string(),
        }
    }
}

/// A stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
}

impl Cookie {
    pub fn new(name: &str, value: &str, options: &CookieOptions) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            path: options.path.clone(),
        }
    }
}

/// Renders the `Set-Cookie` form, e.g. `x-ephemeral-id=abc123; path=/`.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; path={}", self.name, self.value, self.path)
    }
}

/// Key-value cookie store.
///
/// Reads and writes are synchronous and local. A missing cookie is `None`,
/// never an error. Writes return nothing; stores that can fail to persist
/// log the failure instead.
pub trait CookieStore: Send + Sync {
    fn read(&self, name: &str) -> Option<String>;

    fn write(&self, name: &str, value: &str, options: &CookieOptions);
}

impl<T: CookieStore + ?Sized> CookieStore for Arc<T> {
    fn read(&self, name: &str) -> Option<String> {
        (**self).read(name)
    }

    fn write(&self, name: &str, value: &str, options: &CookieOptions) {
        (**self).write(name, value, options)
    }
}

impl<T: CookieStore + ?Sized> CookieStore for Box<T> {
    fn read(&self, name: &str) -> Option<String> {
        (**self).read(name)
    }

    fn write(&self, name: &str, value: &str, options: &CookieOptions) {
        (**self).write(name, value, options)
    }
}

/// In-memory store. Lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full cookie (value and path) stored under `name`.
    pub fn get(&self, name: &str) -> Option<Cookie> {
        self.cookies
            .lock()
            .ok()
            .and_then(|cookies| cookies.get(name).cloned())
    }
}

impl CookieStore for MemoryCookieStore {
    fn read(&self, name: &str) -> Option<String> {
        self.get(name).map(|cookie| cookie.value)
    }

    fn write(&self, name: &str, value: &str, options: &CookieOptions) {
        match self.cookies.lock() {
            Ok(mut cookies) => {
                cookies.insert(name.to_string(), Cookie::new(name, value, options));
            }
            Err(_) => {
                tracing::warn!(cookie = %name, "Cookie store lock poisoned, write dropped");
            }
        }
    }
}

/// Cookie jar persisted as a JSON object keyed by cookie name.
///
/// Every write rewrites the file.
#[derive(Debug)]
pub struct FileCookieStore {
    path: PathBuf,
    cookies: Mutex<BTreeMap<String, Cookie>>,
}

impl FileCookieStore {
    /// Open the jar at `path`. A missing file is an empty jar.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CookieError> {
        let path = path.as_ref().to_path_buf();
        let cookies = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| CookieError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(CookieError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };

        tracing::debug!(path = %path.display(), count = cookies.len(), "Cookie jar loaded");

        Ok(Self {
            path,
            cookies: Mutex::new(cookies),
        })
    }

    fn persist(&self, cookies: &BTreeMap<String, Cookie>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(cookies)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl CookieStore for FileCookieStore {
    fn read(&self, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .ok()
            .and_then(|cookies| cookies.get(name).map(|cookie| cookie.value.clone()))
    }

    fn write(&self, name: &str, value: &str, options: &CookieOptions) {
        let Ok(mut cookies) = self.cookies.lock() else {
            tracing::warn!(
                cookie = %name,
                path = %self.path.display(),
                "Cookie jar lock poisoned, write dropped"
            );
            return;
        };
        cookies.insert(name.to_string(), Cookie::new(name, value, options));

        if let Err(e) = self.persist(&cookies) {
            tracing::warn!(
                error = %e,
                path = %self.path.display(),
                cookie = %name,
                "Failed to persist cookie jar"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_jar() -> PathBuf {
        std::env::temp_dir().join(format!("ephemeral-id-jar-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_cookie_renders_set_cookie_form() {
        let cookie = Cookie::new("x-ephemeral-id", "abc123", &CookieOptions::root());
        assert_eq!(cookie.to_string(), "x-ephemeral-id=abc123; path=/");
    }

    #[test]
    fn test_memory_store_missing_cookie_is_none() {
        let store = MemoryCookieStore::new();
        assert_eq!(store.read("x-ephemeral-id"), None);
    }

    #[test]
    fn test_memory_store_keeps_path() {
        let store = MemoryCookieStore::new();
        store.write("x-ephemeral-id", "abc123", &CookieOptions::root());

        assert_eq!(store.read("x-ephemeral-id").as_deref(), Some("abc123"));
        let cookie = store.get("x-ephemeral-id").unwrap();
        assert_eq!(cookie.path, "/");
    }

    #[test]
    fn test_shared_store_through_arc() {
        let store = Arc::new(MemoryCookieStore::new());
        let handle: Arc<dyn CookieStore> = store.clone();
        handle.write("session", "s1", &CookieOptions::root());
        assert_eq!(store.read("session").as_deref(), Some("s1"));
    }

    #[test]
    fn test_poisoned_memory_store_drops_write() {
        let store = Arc::new(MemoryCookieStore::new());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.cookies.lock().unwrap();
            panic!("panic while holding the cookie lock");
        })
        .join();
        assert!(store.cookies.is_poisoned());

        store.write("x-ephemeral-id", "abc123", &CookieOptions::root());
        assert_eq!(store.read("x-ephemeral-id"), None);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let path = temp_jar();
        let store = FileCookieStore::open(&path).unwrap();
        assert_eq!(store.read("x-ephemeral-id"), None);
        assert!(!path.exists(), "opening must not create the jar");
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_jar();
        {
            let store = FileCookieStore::open(&path).unwrap();
            store.write("x-ephemeral-id", "persisted-id", &CookieOptions::root());
        }

        let reopened = FileCookieStore::open(&path).unwrap();
        assert_eq!(reopened.read("x-ephemeral-id").as_deref(), Some("persisted-id"));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["x-ephemeral-id"]["path"], "/");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_file_store_rejects_corrupt_jar() {
        let path = temp_jar();
        std::fs::write(&path, b"not json").unwrap();

        let err = FileCookieStore::open(&path).unwrap_err();
        assert!(matches!(err, CookieError::Parse { .. }), "got {err:?}");

        std::fs::remove_file(&path).ok();
    }
}
