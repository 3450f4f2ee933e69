//! # Function Lifecycle Manager
//!
//! Deploys one processing function.
//!
//! ```text
//! describe ──absent──→ create (code + configuration + environment)
//!     │
//!     └──present──→ update code ──→ update timeout/memory ──→ update environment
//! ```
//!
//! The update path always runs all three steps: it is a full cycle, not a
//! diff. Each step stops the deploy on failure, and the error names the
//! step so the operator knows what state the function was left in.

use std::sync::Arc;

use async_trait::async_trait;
use billing_types::{ErrorClass, FunctionSpec};
use tracing::{info, warn};

use super::locks::NameLocks;
use crate::algorithms::CodeBundle;
use crate::domain::{validate_sizing, DeployAction, DeployError, DeployResult, FunctionSizing};
use crate::ports::{FunctionClient, FunctionConfigUpdate, FunctionDeployerApi};

/// Creates or updates functions through a `FunctionClient`.
pub struct FunctionLifecycleManager<C: FunctionClient> {
    client: Arc<C>,
    role_arn: String,
    locks: NameLocks,
}

impl<C: FunctionClient> FunctionLifecycleManager<C> {
    /// Create a manager deploying with the given execution role.
    pub fn new(client: Arc<C>, role_arn: impl Into<String>) -> Self {
        Self {
            client,
            role_arn: role_arn.into(),
            locks: NameLocks::new(),
        }
    }

    /// Execution role ARN used on create.
    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    fn validate(spec: &FunctionSpec) -> Result<(), DeployError> {
        if spec.name.trim().is_empty() {
            return Err(DeployError::InvalidSpec("function name is empty".to_string()));
        }
        if spec.handler.trim().is_empty() || spec.runtime.trim().is_empty() {
            return Err(DeployError::InvalidSpec(format!(
                "{}: handler and runtime are required",
                spec.name
            )));
        }
        validate_sizing(
            &spec.name,
            FunctionSizing {
                timeout_secs: spec.timeout_secs,
                memory_mb: spec.memory_mb,
            },
        )
        .map_err(|e| DeployError::InvalidSpec(e.to_string()))
    }

    async fn create(&self, spec: &FunctionSpec, bundle: &CodeBundle) -> Result<bool, DeployError> {
        match self.client.create_function(spec, &self.role_arn, bundle).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_benign() => {
                warn!(function = %spec.name, "Function appeared concurrently, updating instead");
                Ok(false)
            }
            Err(source) => Err(DeployError::Create {
                function: spec.name.clone(),
                source,
            }),
        }
    }

    async fn update(&self, spec: &FunctionSpec, bundle: &CodeBundle) -> Result<(), DeployError> {
        let name = spec.name.as_str();

        self.client
            .update_function_code(name, bundle)
            .await
            .map_err(|source| DeployError::CodeUpdate {
                function: name.to_string(),
                source,
            })?;
        info!(function = name, sha256 = %bundle.sha256(), "Code updated");

        self.client
            .update_function_configuration(name, &FunctionConfigUpdate::sizing_of(spec))
            .await
            .map_err(|source| DeployError::ConfigurationUpdate {
                function: name.to_string(),
                source,
            })?;

        self.client
            .update_function_configuration(name, &FunctionConfigUpdate::environment_of(spec))
            .await
            .map_err(|source| DeployError::EnvironmentUpdate {
                function: name.to_string(),
                source,
            })?;
        Ok(())
    }
}

#[async_trait]
impl<C: FunctionClient + 'static> FunctionDeployerApi for FunctionLifecycleManager<C> {
    async fn deploy(
        &self,
        spec: &FunctionSpec,
        bundle: &CodeBundle,
    ) -> Result<DeployResult, DeployError> {
        Self::validate(spec)?;
        let _guard = self.locks.acquire(&spec.name).await;

        let exists = match self.client.describe_function(&spec.name).await {
            Ok(state) => state.is_some(),
            Err(e) if e.class() == ErrorClass::Expected => false,
            Err(source) => {
                return Err(DeployError::Describe {
                    function: spec.name.clone(),
                    source,
                })
            }
        };

        let action = if !exists && self.create(spec, bundle).await? {
            DeployAction::Created
        } else {
            self.update(spec, bundle).await?;
            DeployAction::Updated
        };

        info!(
            function = %spec.name,
            action = %action,
            sha256 = %bundle.sha256(),
            size = bundle.size(),
            "Function deployed"
        );
        Ok(DeployResult {
            function_name: spec.name.clone(),
            action,
            code_sha256: bundle.sha256().to_string(),
            code_size: bundle.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryControlPlane, Operation};
    use crate::algorithms::BundleBuilder;
    use billing_types::{ControlPlaneError, ResourceKind};
    use std::collections::BTreeMap;

    const ROLE: &str = "arn:aws:iam::123456789012:role/billing-lambda-role";

    fn spec() -> FunctionSpec {
        FunctionSpec {
            name: "risk-agent".into(),
            runtime: "python3.11".into(),
            handler: "risk_agent.lambda_handler".into(),
            timeout_secs: 60,
            memory_mb: 512,
            environment: BTreeMap::from([("USE_BEDROCK".to_string(), "false".to_string())]),
        }
    }

    fn bundle(body: &[u8]) -> CodeBundle {
        BundleBuilder::new()
            .entry("risk_agent.py", body.to_vec())
            .unwrap()
            .build()
            .unwrap()
    }

    fn manager() -> (Arc<InMemoryControlPlane>, FunctionLifecycleManager<InMemoryControlPlane>) {
        let plane = Arc::new(InMemoryControlPlane::new());
        (plane.clone(), FunctionLifecycleManager::new(plane, ROLE))
    }

    #[tokio::test]
    async fn test_absent_function_created_once() {
        let (plane, manager) = manager();
        let result = manager.deploy(&spec(), &bundle(b"v1")).await.unwrap();

        assert_eq!(result.action, DeployAction::Created);
        assert_eq!(plane.calls(ResourceKind::Function, Operation::Create), 1);
        assert_eq!(plane.calls(ResourceKind::Function, Operation::UpdateCode), 0);
        assert_eq!(
            plane.calls(ResourceKind::Function, Operation::UpdateConfiguration),
            0
        );
        let state = plane.function("risk-agent").unwrap();
        assert_eq!(state.spec, spec());
        assert_eq!(state.role_arn, ROLE);
    }

    #[tokio::test]
    async fn test_existing_function_fully_updated() {
        let (plane, manager) = manager();
        manager.deploy(&spec(), &bundle(b"v1")).await.unwrap();
        plane.reset_calls();

        let mut next = spec();
        next.memory_mb = 1024;
        next.environment.insert("USE_BEDROCK".into(), "true".into());
        let v2 = bundle(b"v2");
        let result = manager.deploy(&next, &v2).await.unwrap();

        assert_eq!(result.action, DeployAction::Updated);
        assert_eq!(result.code_sha256, v2.sha256());
        assert_eq!(plane.calls(ResourceKind::Function, Operation::Create), 0);
        assert_eq!(plane.calls(ResourceKind::Function, Operation::UpdateCode), 1);
        assert_eq!(
            plane.calls(ResourceKind::Function, Operation::UpdateConfiguration),
            2
        );
        let state = plane.function("risk-agent").unwrap();
        assert_eq!(state.spec, next);
        assert_eq!(state.code_sha256, v2.sha256());
    }

    #[tokio::test]
    async fn test_unchanged_function_still_updated() {
        let (plane, manager) = manager();
        manager.deploy(&spec(), &bundle(b"v1")).await.unwrap();
        plane.reset_calls();

        let result = manager.deploy(&spec(), &bundle(b"v1")).await.unwrap();
        assert_eq!(result.action, DeployAction::Updated);
        assert_eq!(plane.calls(ResourceKind::Function, Operation::UpdateCode), 1);
    }

    #[tokio::test]
    async fn test_failed_code_update_keeps_previous_code() {
        let (plane, manager) = manager();
        let v1 = bundle(b"v1");
        manager.deploy(&spec(), &v1).await.unwrap();
        plane.fail_next(
            ResourceKind::Function,
            Operation::UpdateCode,
            1,
            ControlPlaneError::TransientNetwork("upload interrupted".into()),
        );

        let err = manager.deploy(&spec(), &bundle(b"v2")).await.unwrap_err();
        assert!(matches!(err, DeployError::CodeUpdate { .. }));
        assert_eq!(plane.function("risk-agent").unwrap().code_sha256, v1.sha256());
        assert_eq!(
            plane.calls(ResourceKind::Function, Operation::UpdateConfiguration),
            0
        );
    }

    #[tokio::test]
    async fn test_failed_configuration_update_keeps_new_code() {
        let (plane, manager) = manager();
        manager.deploy(&spec(), &bundle(b"v1")).await.unwrap();
        plane.fail_next(
            ResourceKind::Function,
            Operation::UpdateConfiguration,
            1,
            ControlPlaneError::PermissionDenied("lambda:UpdateFunctionConfiguration".into()),
        );

        let v2 = bundle(b"v2");
        let err = manager.deploy(&spec(), &v2).await.unwrap_err();
        assert!(matches!(err, DeployError::ConfigurationUpdate { .. }));
        assert_eq!(plane.function("risk-agent").unwrap().code_sha256, v2.sha256());
    }

    #[tokio::test]
    async fn test_failed_environment_update_reported() {
        let (plane, manager) = manager();
        manager.deploy(&spec(), &bundle(b"v1")).await.unwrap();

        let mut next = spec();
        next.memory_mb = 1024;
        next.environment.insert("PAYLOAD".into(), "x".repeat(5_000));
        let err = manager.deploy(&next, &bundle(b"v2")).await.unwrap_err();

        assert!(matches!(err, DeployError::EnvironmentUpdate { .. }));
        let state = plane.function("risk-agent").unwrap();
        assert_eq!(state.spec.memory_mb, 1024);
        assert_eq!(state.spec.environment, spec().environment);
    }

    #[tokio::test]
    async fn test_create_race_falls_back_to_update() {
        let (plane, manager) = manager();
        manager.deploy(&spec(), &bundle(b"v1")).await.unwrap();
        plane.fail_next(
            ResourceKind::Function,
            Operation::Describe,
            1,
            ControlPlaneError::not_found(ResourceKind::Function, &"risk-agent".into()),
        );
        plane.reset_calls();

        let result = manager.deploy(&spec(), &bundle(b"v2")).await.unwrap();
        assert_eq!(result.action, DeployAction::Updated);
        assert_eq!(plane.calls(ResourceKind::Function, Operation::Create), 1);
        assert_eq!(plane.calls(ResourceKind::Function, Operation::UpdateCode), 1);
    }

    #[tokio::test]
    async fn test_invalid_spec_rejected_locally() {
        let (plane, manager) = manager();
        let mut bad = spec();
        bad.memory_mb = 64;

        let err = manager.deploy(&bad, &bundle(b"v1")).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidSpec(_)));
        assert_eq!(plane.calls(ResourceKind::Function, Operation::Describe), 0);
    }
}
