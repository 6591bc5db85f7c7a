//! Observer registry keyed by event category.
//!
//! Each category holds an ordered list of observers. Registering never
//! replaces an existing observer, and dispatch follows registration order.

use std::fmt;
use std::sync::Arc;

use hookr_core::HookEvent;

use crate::client::ConnectionInfo;
use crate::error::RelayError;

/// Event categories an observer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Connected,
    HookCalled,
    Error,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::HookCalled => "hook-called",
            Self::Error => "error",
        })
    }
}

/// Token returned on registration, used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId {
    category: Category,
    seq: u64,
}

impl CallbackId {
    pub const fn category(self) -> Category {
        self.category
    }
}

pub type ConnectedCallback = Arc<dyn Fn(&ConnectionInfo) + Send + Sync>;
pub type HookCallback = Arc<dyn Fn(&HookEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&RelayError) + Send + Sync>;

/// Ordered observer list for one category.
struct Observers<F: ?Sized> {
    entries: Vec<(u64, Arc<F>)>,
}

impl<F: ?Sized> Default for Observers<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<F: ?Sized> Observers<F> {
    fn push(&mut self, seq: u64, callback: Arc<F>) {
        self.entries.push((seq, callback));
    }

    fn remove(&mut self, seq: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(s, _)| *s != seq);
        self.entries.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }
}

/// Mapping from [`Category`] to its ordered observers.
#[derive(Default)]
pub struct CallbackRegistry {
    connected: Observers<dyn Fn(&ConnectionInfo) + Send + Sync>,
    hook_called: Observers<dyn Fn(&HookEvent) + Send + Sync>,
    error: Observers<dyn Fn(&RelayError) + Send + Sync>,
    next_seq: u64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self, category: Category) -> CallbackId {
        self.next_seq += 1;
        CallbackId {
            category,
            seq: self.next_seq,
        }
    }

    pub fn add_connected(&mut self, callback: ConnectedCallback) -> CallbackId {
        let id = self.next_id(Category::Connected);
        self.connected.push(id.seq, callback);
        id
    }

    pub fn add_hook_called(&mut self, callback: HookCallback) -> CallbackId {
        let id = self.next_id(Category::HookCalled);
        self.hook_called.push(id.seq, callback);
        id
    }

    pub fn add_error(&mut self, callback: ErrorCallback) -> CallbackId {
        let id = self.next_id(Category::Error);
        self.error.push(id.seq, callback);
        id
    }

    /// Remove one observer. Returns `false` if it was already gone.
    pub fn remove(&mut self, id: CallbackId) -> bool {
        match id.category {
            Category::Connected => self.connected.remove(id.seq),
            Category::HookCalled => self.hook_called.remove(id.seq),
            Category::Error => self.error.remove(id.seq),
        }
    }

    /// Number of observers registered for a category.
    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::Connected => self.connected.entries.len(),
            Category::HookCalled => self.hook_called.entries.len(),
            Category::Error => self.error.entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connected.entries.is_empty()
            && self.hook_called.entries.is_empty()
            && self.error.entries.is_empty()
    }

    // Snapshots are taken so observers run without the registry borrowed,
    // which lets an observer register, remove, or close re-entrantly.

    pub fn connected_observers(&self) -> Vec<ConnectedCallback> {
        self.connected.snapshot()
    }

    pub fn hook_observers(&self) -> Vec<HookCallback> {
        self.hook_called.snapshot()
    }

    pub fn error_observers(&self) -> Vec<ErrorCallback> {
        self.error.snapshot()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("connected", &self.connected.entries.len())
            .field("hook_called", &self.hook_called.entries.len())
            .field("error", &self.error.entries.len())
            .finish()
    }
}
