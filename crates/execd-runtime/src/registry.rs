//! Session registry: the single source of truth for command sessions.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use execd_core::{Error, Result, SessionId};

use crate::kernel::CommandKernel;

/// Concurrent store of command kernels keyed by session id.
///
/// Lookups may run concurrently; inserts and updates are serialized. All
/// mutation of a kernel happens inside [`SessionRegistry::update`] so
/// readers never observe a half-applied change.
pub trait SessionRegistry: Send + Sync {
    /// Insert a new kernel. Fails if the id is already registered.
    fn register(&self, kernel: CommandKernel) -> Result<()>;

    /// Whether `session_id` is registered.
    fn contains(&self, session_id: &SessionId) -> bool;

    /// Run `f` against a kernel under the read lock.
    fn read(&self, session_id: &SessionId, f: &mut dyn FnMut(&CommandKernel)) -> Result<()>;

    /// Run `f` against a kernel under the write lock.
    fn update(&self, session_id: &SessionId, f: &mut dyn FnMut(&mut CommandKernel)) -> Result<()>;

    /// Remove and return a kernel.
    fn remove(&self, session_id: &SessionId) -> Option<CommandKernel>;

    /// All registered session ids.
    fn session_ids(&self) -> Vec<SessionId>;
}

/// Closure-returning helpers over any [`SessionRegistry`].
pub trait SessionRegistryExt: SessionRegistry {
    /// Read a value out of a kernel.
    fn inspect<R>(&self, session_id: &SessionId, f: impl FnOnce(&CommandKernel) -> R) -> Result<R> {
        let mut f = Some(f);
        let mut out = None;
        self.read(session_id, &mut |kernel| {
            if let Some(f) = f.take() {
                out = Some(f(kernel));
            }
        })?;
        out.ok_or_else(|| Error::SessionNotFound(session_id.clone()))
    }

    /// Mutate a kernel and return a value.
    fn modify<R>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut CommandKernel) -> R,
    ) -> Result<R> {
        let mut f = Some(f);
        let mut out = None;
        self.update(session_id, &mut |kernel| {
            if let Some(f) = f.take() {
                out = Some(f(kernel));
            }
        })?;
        out.ok_or_else(|| Error::SessionNotFound(session_id.clone()))
    }
}

impl<T: SessionRegistry + ?Sized> SessionRegistryExt for T {}

/// In-process registry backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    kernels: RwLock<HashMap<SessionId, CommandKernel>>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.kernels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionRegistry for InMemoryRegistry {
    fn register(&self, kernel: CommandKernel) -> Result<()> {
        let mut kernels = self.kernels.write().unwrap_or_else(PoisonError::into_inner);
        let session_id = kernel.session_id().clone();
        if kernels.contains_key(&session_id) {
            return Err(Error::DuplicateSession(session_id));
        }
        debug!("Registering session: {}", session_id);
        kernels.insert(session_id, kernel);
        Ok(())
    }

    fn contains(&self, session_id: &SessionId) -> bool {
        self.kernels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    fn read(&self, session_id: &SessionId, f: &mut dyn FnMut(&CommandKernel)) -> Result<()> {
        let kernels = self.kernels.read().unwrap_or_else(PoisonError::into_inner);
        let kernel = kernels
            .get(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.clone()))?;
        f(kernel);
        Ok(())
    }

    fn update(&self, session_id: &SessionId, f: &mut dyn FnMut(&mut CommandKernel)) -> Result<()> {
        let mut kernels = self.kernels.write().unwrap_or_else(PoisonError::into_inner);
        let kernel = kernels
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.clone()))?;
        f(kernel);
        Ok(())
    }

    fn remove(&self, session_id: &SessionId) -> Option<CommandKernel> {
        self.kernels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    fn session_ids(&self) -> Vec<SessionId> {
        self.kernels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
