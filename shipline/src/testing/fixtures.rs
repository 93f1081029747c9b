//! Reference pipelines for tests and benchmarks.

use std::sync::Arc;

use super::ScriptedCapabilities;
use crate::definition::{
    ActionDefinition, ApprovalConfig, BuildConfig, ComputeType, DeployConfig, PipelineDefinition,
    PublishConfig, SourceConfig, StageDefinition,
};
use crate::executors::ExecutorRegistry;

/// The six-stage container delivery pipeline.
///
/// `Source` produces `src`; `Test` and `Build` both consume it; `Publish`
/// turns Build's `build` output into `image`; `DeployTest` rolls `image` out
/// to the test service; `DeployProd` waits on the `Approve` gate
/// (run order 1) before `Deploy-Prod` (run order 2) ships the same image.
#[must_use]
pub fn delivery_pipeline() -> PipelineDefinition {
    PipelineDefinition::new("container-delivery")
        .with_stage(StageDefinition::new("Source").with_action(
            ActionDefinition::source(
                "Checkout",
                SourceConfig::github("acme", "storefront").with_branch("main"),
            )
            .with_output("src"),
        ))
        .with_stage(StageDefinition::new("Test").with_action(
            ActionDefinition::build(
                "Unit-Test",
                BuildConfig::new("buildspec_test.yml")
                    .with_compute(ComputeType::Large)
                    .privileged(),
            )
            .with_input("src"),
        ))
        .with_stage(StageDefinition::new("Build").with_action(
            ActionDefinition::build("Compile", BuildConfig::new("buildspec.yml"))
                .with_input("src")
                .with_output("build"),
        ))
        .with_stage(StageDefinition::new("Publish").with_action(
            ActionDefinition::publish(
                "Docker-Push",
                PublishConfig::new("123456789012.dkr.ecr.eu-west-1.amazonaws.com/storefront")
                    .with_script("buildspec_docker.yml")
                    .with_signing_profile("storefront-signer"),
            )
            .with_input("build")
            .with_output("image"),
        ))
        .with_stage(StageDefinition::new("DeployTest").with_action(
            ActionDefinition::deploy(
                "Deploy-Test",
                DeployConfig::new("storefront-test").with_environment("test"),
            )
            .with_input("image"),
        ))
        .with_stage(
            StageDefinition::new("DeployProd")
                .with_action(ActionDefinition::approval(
                    "Approve",
                    ApprovalConfig::default().with_instructions("Verify the test deployment"),
                ))
                .with_action(
                    ActionDefinition::deploy(
                        "Deploy-Prod",
                        DeployConfig::new("storefront-prod").with_environment("prod"),
                    )
                    .with_input("image")
                    .with_run_order(2),
                ),
        )
}

/// A pipeline whose last stage is `[Deploy-Test(1), Approve(1), Deploy-Prod(2)]`.
#[must_use]
pub fn gated_promotion_pipeline() -> PipelineDefinition {
    PipelineDefinition::new("gated-promotion")
        .with_stage(StageDefinition::new("Source").with_action(
            ActionDefinition::source("Checkout", SourceConfig::github("acme", "storefront"))
                .with_output("src"),
        ))
        .with_stage(StageDefinition::new("Publish").with_action(
            ActionDefinition::publish("Docker-Push", PublishConfig::new("registry/storefront"))
                .with_input("src")
                .with_output("image"),
        ))
        .with_stage(
            StageDefinition::new("Promote")
                .with_action(
                    ActionDefinition::deploy("Deploy-Test", DeployConfig::new("storefront-test"))
                        .with_input("image"),
                )
                .with_action(ActionDefinition::approval("Approve", ApprovalConfig::default()))
                .with_action(
                    ActionDefinition::deploy("Deploy-Prod", DeployConfig::new("storefront-prod"))
                        .with_input("image")
                        .with_run_order(2),
                ),
        )
}

/// Registers `capabilities` for every external executor kind.
#[must_use]
pub fn scripted_registry(capabilities: &Arc<ScriptedCapabilities>) -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with_source(capabilities.clone())
        .with_build(capabilities.clone())
        .with_publish(capabilities.clone())
        .with_deploy(capabilities.clone())
}
