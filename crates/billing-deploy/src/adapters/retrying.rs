//! # Retry Decorator
//!
//! Wraps any control plane with a per-call timeout and exponential backoff
//! on retryable errors. Benign, expected and fatal errors pass through on
//! the first attempt.
//!
//! ```text
//! attempt 1 ──timeout/transient──→ sleep 500ms ──→ attempt 2 ──→ sleep 1s ──→ attempt 3
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use billing_types::{ControlPlaneError, FunctionSpec, ResourceName};
use tracing::warn;

use crate::algorithms::CodeBundle;
use crate::domain::RetryPolicy;
use crate::ports::{FunctionClient, FunctionConfigUpdate, FunctionState, Resource, ResourceClient};

/// Control plane with bounded calls and retries.
#[derive(Debug)]
pub struct RetryingControlPlane<C> {
    inner: Arc<C>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl<C> RetryingControlPlane<C> {
    /// Wrap `inner`.
    pub fn new(inner: Arc<C>, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            call_timeout,
        }
    }

    /// The wrapped control plane.
    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }

    /// Run `call` under the timeout, retrying retryable failures.
    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        resource: &str,
        mut call: F,
    ) -> Result<T, ControlPlaneError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ControlPlaneError>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ControlPlaneError::Timeout(
                    self.call_timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                )),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        operation,
                        resource,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retryable control-plane error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<C, R> ResourceClient<R> for RetryingControlPlane<C>
where
    C: ResourceClient<R>,
    R: Resource,
{
    async fn describe(&self, name: &ResourceName) -> Result<Option<R>, ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("describe", name.as_str(), || {
            ResourceClient::<R>::describe(inner, name)
        })
        .await
    }

    async fn create(&self, spec: &R) -> Result<(), ControlPlaneError> {
        let inner = self.inner.as_ref();
        let name = spec.resource_name();
        self.call("create", name.as_str(), || ResourceClient::<R>::create(inner, spec))
            .await
    }

    async fn update(&self, name: &ResourceName, spec: &R) -> Result<(), ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("update", name.as_str(), || {
            ResourceClient::<R>::update(inner, name, spec)
        })
        .await
    }

    async fn delete(&self, name: &ResourceName) -> Result<(), ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("delete", name.as_str(), || {
            ResourceClient::<R>::delete(inner, name)
        })
        .await
    }
}

#[async_trait]
impl<C: FunctionClient> FunctionClient for RetryingControlPlane<C> {
    async fn describe_function(
        &self,
        name: &str,
    ) -> Result<Option<FunctionState>, ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("describe_function", name, || inner.describe_function(name))
            .await
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        role_arn: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("create_function", &spec.name, || {
            inner.create_function(spec, role_arn, bundle)
        })
        .await
    }

    async fn update_function_code(
        &self,
        name: &str,
        bundle: &CodeBundle,
    ) -> Result<(), ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("update_function_code", name, || {
            inner.update_function_code(name, bundle)
        })
        .await
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        update: &FunctionConfigUpdate,
    ) -> Result<(), ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("update_function_configuration", name, || {
            inner.update_function_configuration(name, update)
        })
        .await
    }

    async fn delete_function(&self, name: &str) -> Result<(), ControlPlaneError> {
        let inner = self.inner.as_ref();
        self.call("delete_function", name, || inner.delete_function(name))
            .await
    }
}
