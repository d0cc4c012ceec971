//! Session-scoped storage for flags that must survive a page reload.

use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};

/// Key of the flag suppressing auto-reconnect after an explicit logout.
pub const EXPLICIT_LOGOUT_KEY: &str = "foresight.wallet.explicit_logout";

/// Minimal key/value store, `sessionStorage` in a browser.
pub trait SessionStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process [`SessionStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

pub(crate) fn explicit_logout(store: &dyn SessionStore) -> bool {
    store.get(EXPLICIT_LOGOUT_KEY).is_some_and(|value| value == "1")
}

pub(crate) fn set_explicit_logout(store: &dyn SessionStore, logged_out: bool) {
    if logged_out {
        store.set(EXPLICIT_LOGOUT_KEY, "1".to_string());
    } else {
        store.remove(EXPLICIT_LOGOUT_KEY);
    }
}
