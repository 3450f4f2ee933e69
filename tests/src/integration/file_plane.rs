//! # File-Backed Control Plane
//!
//! The plane the CLI uses: state survives between processes and every call
//! holds an exclusive lock on the state file.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use billing_bus::{EventRouter, DEFAULT_MAX_HOPS};
    use billing_deploy::{
        DeployTarget, DeploymentPipeline, DirectoryBundleSource, FileControlPlane,
        ProcessingFunction,
    };
    use tempfile::TempDir;

    use crate::fixtures::{account, config, receipt_uploaded, SimulatedFunctions, StaticBundles};

    const BUS: &str = "billing-events";

    fn sources(dir: &TempDir) -> DirectoryBundleSource {
        let src = dir.path().join("src");
        let deps = dir.path().join("deps/requests");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&deps).unwrap();
        for function in ProcessingFunction::ALL {
            std::fs::write(
                src.join(function.entry_file()),
                format!("def lambda_handler(event, context):\n    return '{}'\n", function.name()),
            )
            .unwrap();
        }
        std::fs::write(deps.join("__init__.py"), "").unwrap();
        DirectoryBundleSource::new(src, Some(dir.path().join("deps")))
    }

    #[tokio::test]
    async fn test_state_survives_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");

        let first = DeploymentPipeline::new(
            config(),
            Arc::new(FileControlPlane::new(&state)),
            sources(&dir),
        )
        .run(DeployTarget::All)
        .await
        .unwrap();
        assert!(first.is_success(), "{first}");
        assert_eq!(first.topology.count("created"), 13);

        // A fresh handle, as a second process would open it.
        let second = DeploymentPipeline::new(
            config(),
            Arc::new(FileControlPlane::new(&state)),
            sources(&dir),
        )
        .run(DeployTarget::All)
        .await
        .unwrap();
        assert!(second.topology.is_noop(), "{second}");

        let snapshot = FileControlPlane::new(&state).snapshot().unwrap();
        let risk = &snapshot.functions["risk-agent"];
        assert_eq!(risk.spec.handler, "risk_agent.lambda_handler");
        // Created, then code, sizing and environment each bumped it.
        assert_eq!(risk.revision, 4);
    }

    #[tokio::test]
    async fn test_identical_sources_keep_code_hash() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        let plane = Arc::new(FileControlPlane::new(&state));

        DeploymentPipeline::new(config(), plane.clone(), sources(&dir))
            .run(DeployTarget::All)
            .await
            .unwrap();
        let before = plane.snapshot().unwrap().functions["communication-agent"].code_sha256.clone();

        DeploymentPipeline::new(config(), plane.clone(), sources(&dir))
            .run(DeployTarget::All)
            .await
            .unwrap();
        let after = plane.snapshot().unwrap().functions["communication-agent"].code_sha256.clone();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_concurrent_handles_share_one_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");

        let a = DeploymentPipeline::new(
            config(),
            Arc::new(FileControlPlane::new(&state)),
            StaticBundles::new(),
        );
        let b = DeploymentPipeline::new(
            config(),
            Arc::new(FileControlPlane::new(&state)),
            StaticBundles::new(),
        );
        let (ra, rb) = tokio::join!(a.run(DeployTarget::All), b.run(DeployTarget::All));
        assert!(ra.unwrap().is_success());
        assert!(rb.unwrap().is_success());

        let snapshot = FileControlPlane::new(&state).snapshot().unwrap();
        assert_eq!(snapshot.rules.len(), 4);
        assert_eq!(snapshot.permissions.len(), 4);
        assert_eq!(snapshot.functions.len(), 3);
    }

    #[tokio::test]
    async fn test_routing_from_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        DeploymentPipeline::new(
            config(),
            Arc::new(FileControlPlane::new(&state)),
            StaticBundles::new(),
        )
        .run(DeployTarget::All)
        .await
        .unwrap();

        let table = FileControlPlane::new(&state)
            .routing_table(BUS, &account())
            .unwrap();
        let functions = Arc::new(SimulatedFunctions::new());
        let router = EventRouter::new(table, functions.clone());

        let chain = router
            .run_chain(receipt_uploaded(BUS), DEFAULT_MAX_HOPS)
            .await
            .unwrap();
        assert_eq!(chain.invocations_of("receipt-processing-agent"), 1);
        assert_eq!(chain.invocations_of("communication-agent"), 1);
    }
}
