//! # File-Backed Control Plane
//!
//! Persists the simulated control plane as one JSON document. Every call
//! holds an exclusive `fs2` lock on a sibling `.lock` file for its whole
//! read-modify-write cycle, so concurrent deployer processes never
//! interleave a create with another create of the same resource.
//!
//! Client calls wait for the lock by polling, which keeps them cancellable
//! by the per-call timeout. Writes go to a temporary file in the same
//! directory that is renamed over the state file, so a crash mid-write
//! leaves the previous state intact.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use billing_bus::RoutingTable;
use billing_types::{AccountContext, ControlPlaneError, FunctionSpec, ResourceName};
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::trace;

use super::state::{PlaneSnapshot, StoredResource};
use crate::algorithms::CodeBundle;
use crate::ports::{FunctionClient, FunctionConfigUpdate, FunctionState, ResourceClient};

/// Interval between attempts on a contended state lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Control plane stored in a local JSON file.
#[derive(Debug, Clone)]
pub struct FileControlPlane {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileControlPlane {
    /// Use the state file at `path`, created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
        }
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file guarding the state file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Current content of the state file. Blocks while another writer
    /// holds the lock.
    pub fn snapshot(&self) -> Result<PlaneSnapshot, ControlPlaneError> {
        let lock = self.open_lock()?;
        lock.lock_exclusive().map_err(|e| self.io_error(e))?;
        let result = self.transact_locked(false, |state| Ok(state.clone()));
        let _ = FileExt::unlock(&lock);
        result
    }

    /// Routing table of `bus_name` with the grants actually present.
    pub fn routing_table(
        &self,
        bus_name: &str,
        account: &AccountContext,
    ) -> Result<RoutingTable, ControlPlaneError> {
        Ok(self.snapshot()?.routing_table(bus_name, account))
    }

    /// Run `op` against the stored state under the file lock.
    ///
    /// The state is written back only when `write` is set and `op` succeeded.
    async fn transact<T>(
        &self,
        write: bool,
        op: impl FnOnce(&mut PlaneSnapshot) -> Result<T, ControlPlaneError>,
    ) -> Result<T, ControlPlaneError> {
        let lock = self.acquire_lock().await?;
        let result = self.transact_locked(write, op);
        let _ = FileExt::unlock(&lock);
        result
    }

    fn open_lock(&self) -> Result<File, ControlPlaneError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| self.io_error(e))
    }

    /// Wait for the exclusive lock without blocking the runtime.
    async fn acquire_lock(&self) -> Result<File, ControlPlaneError> {
        let lock = self.open_lock()?;
        let contended = fs2::lock_contended_error().kind();
        loop {
            match lock.try_lock_exclusive() {
                Ok(()) => return Ok(lock),
                Err(e) if e.kind() == contended => {
                    trace!(path = %self.lock_path.display(), "State lock contended");
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(self.io_error(e)),
            }
        }
    }

    fn transact_locked<T>(
        &self,
        write: bool,
        op: impl FnOnce(&mut PlaneSnapshot) -> Result<T, ControlPlaneError>,
    ) -> Result<T, ControlPlaneError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.io_error(e)),
        };
        let mut state: PlaneSnapshot = if raw.trim().is_empty() {
            PlaneSnapshot::default()
        } else {
            serde_json::from_str(&raw).map_err(|e| {
                ControlPlaneError::ConfigInvalid(format!(
                    "corrupt state file {}: {e}",
                    self.path.display()
                ))
            })?
        };

        let value = op(&mut state)?;

        if write {
            self.replace(&state)?;
        }
        Ok(value)
    }

    /// Write `state` to a temporary sibling and rename it over the state file.
    fn replace(&self, state: &PlaneSnapshot) -> Result<(), ControlPlaneError> {
        let encoded = serde_json::to_vec_pretty(state)
            .map_err(|e| ControlPlaneError::ConfigInvalid(e.to_string()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        staged.write_all(&encoded).map_err(|e| self.io_error(e))?;
        staged.as_file().sync_all().map_err(|e| self.io_error(e))?;
        staged
            .persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        trace!(path = %self.path.display(), bytes = encoded.len(), "State file written");
        Ok(())
    }

    fn io_error(&self, e: io::Error) -> ControlPlaneError {
        classify_io_error(&self.path, e)
    }
}

/// Map a state file I/O error to the control-plane error class it deserves.
///
/// Only interruptions are worth a retry; a refused or full disk is not.
fn classify_io_error(path: &Path, e: io::Error) -> ControlPlaneError {
    let detail = format!("state file {}: {e}", path.display());
    match e.kind() {
        ErrorKind::PermissionDenied => ControlPlaneError::PermissionDenied(detail),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            ControlPlaneError::TransientNetwork(detail)
        }
        _ => ControlPlaneError::ConfigInvalid(detail),
    }
}

#[async_trait]
impl<R: StoredResource> ResourceClient<R> for FileControlPlane {
    async fn describe(&self, name: &ResourceName) -> Result<Option<R>, ControlPlaneError> {
        self.transact(false, |state| Ok(state.get(name))).await
    }

    async fn create(&self, spec: &R) -> Result<(), ControlPlaneError> {
        self.transact(true, |state| state.create(spec))
            .await
    }

    async fn update(&self, name: &ResourceName, spec: &R) -> Result<(), ControlPlaneError> {
        self.transact(true, |state| state.update(name, spec))
            .await
    }

    async fn delete(&self, name: &ResourceName) -> Result<(), ControlPlaneError> {
        self.transact(true, |state| state.delete::<R>(name))
            .await
    }
}

#[async_trait]
impl FunctionClient for FileControlPlane {
    async fn describe_function(
        &self,
        name: &str,
    ) -> Result<Option<FunctionState>, ControlPlaneError> {
        self.transact(false, |state| Ok(state.functions.get(name).cloned()))
            .await
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        role_arn: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        self.transact(true, |state| state.create_function(spec, role_arn, bundle))
            .await
    }

    async fn update_function_code(
        &self,
        name: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        self.transact(true, |state| state.update_function_code(name, bundle))
            .await
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        update: &FunctionConfigUpdate,
    ) -> Result<(), ControlPlaneError> {
        self.transact(true, |state| state.update_function_configuration(name, update))
            .await
    }

    async fn delete_function(&self, name: &str) -> Result<(), ControlPlaneError> {
        self.transact(true, |state| state.delete_function(name))
            .await
    }
}
