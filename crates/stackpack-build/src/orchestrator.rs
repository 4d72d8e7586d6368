//! Fixed-order build pipeline.

use stackpack_common::config::StackpackConfig;
use stackpack_common::types::{BuildId, TargetId};
use stackpack_compose::{Linter, Merger};
use stackpack_package::{PackageOptions, Packager};
use stackpack_rules::DependencyChecker;
use stackpack_template::{FunctionTable, TemplateEngine};

use crate::context::BuildContext;
use crate::error::{BuildError, StageError};
use crate::model::{BuildOutcome, BuildStatus};
use crate::stage::Stage;
use crate::stages;
use crate::store::{ArtifactStore, BuildRecords};

/// Result of one build: the persisted outcome plus the final context.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Outcome as recorded.
    pub outcome: BuildOutcome,
    /// Context as the last executed stage left it.
    pub context: BuildContext,
}

/// Drives builds through every [`Stage`] in order.
///
/// The first failing stage halts the build. Its error text is recorded in
/// the outcome; nothing earlier stages produced is rolled back.
#[derive(Debug)]
pub struct BuildOrchestrator<S, R> {
    store: S,
    records: R,
    config: StackpackConfig,
    engine: TemplateEngine,
    checker: DependencyChecker,
    merger: Merger,
    linter: Linter,
    packager: Packager,
}

impl<S: ArtifactStore, R: BuildRecords> BuildOrchestrator<S, R> {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(store: S, records: R, config: StackpackConfig) -> Self {
        Self {
            engine: TemplateEngine::new(FunctionTable::standard(&config.env_allow_list)),
            checker: DependencyChecker::new(),
            merger: Merger::new(),
            linter: Linter::new(),
            packager: Packager::new(PackageOptions::from_config(&config)),
            store,
            records,
            config,
        }
    }

    /// Byte store the orchestrator reads from and uploads to.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Persistence collaborator.
    #[must_use]
    pub const fn records(&self) -> &R {
        &self.records
    }

    /// Runs one build of `target_id`.
    ///
    /// Stage failures do not return `Err`: they end the build with status
    /// `failed` and are reported in [`BuildReport::outcome`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::LoadTarget`] if the target cannot be loaded and
    /// [`BuildError::Record`] if a status or outcome cannot be persisted.
    pub async fn run(&self, build_id: BuildId, target_id: &TargetId) -> Result<BuildReport, BuildError> {
        tracing::info!(build_id = %build_id, target_id = %target_id, "starting build");
        self.record_status(&build_id, BuildStatus::Pending).await?;

        let target = match self.records.load_target(target_id).await {
            Ok(target) => target,
            Err(source) => {
                tracing::error!(build_id = %build_id, target_id = %target_id, error = %source, "target could not be loaded");
                self.record_status(&build_id, BuildStatus::Failed).await?;
                return Err(BuildError::LoadTarget {
                    target: target_id.to_string(),
                    source,
                });
            }
        };

        let mut ctx = BuildContext::new(build_id.clone(), target);
        let mut failure = None;
        for stage in Stage::ALL {
            self.record_status(&build_id, BuildStatus::Building(stage)).await?;
            tracing::info!(build_id = %build_id, stage = %stage, "stage started");
            if let Err(e) = self.run_stage(stage, &mut ctx).await {
                tracing::error!(build_id = %build_id, stage = %stage, error = %e, "stage failed");
                failure = Some((stage, e.to_string()));
                break;
            }
            self.record_status(&build_id, BuildStatus::Building(stage)).await?;
        }

        let outcome = Self::outcome(&ctx, failure);
        self.record_status(&build_id, outcome.status).await?;
        self.records
            .record_outcome(&outcome)
            .await
            .map_err(|source| BuildError::Record {
                build_id: build_id.to_string(),
                source,
            })?;
        tracing::info!(build_id = %build_id, status = %outcome.status, "build finished");
        Ok(BuildReport {
            outcome,
            context: ctx,
        })
    }

    async fn run_stage(&self, stage: Stage, ctx: &mut BuildContext) -> Result<(), StageError> {
        match stage {
            Stage::Validation => stages::validation(ctx),
            Stage::Configuration => stages::configuration(ctx, &self.records, &self.checker).await,
            Stage::TemplateRender => stages::template_render(ctx, &self.store, &self.engine).await,
            Stage::AssetResolution => {
                stages::asset_resolution(ctx, &self.store, &self.engine, &self.config).await
            }
            Stage::ComposeMerge => stages::compose_merge(ctx, &self.merger),
            Stage::Linting => stages::linting(ctx, &self.linter),
            Stage::Packaging => {
                stages::packaging(ctx, &self.store, &self.packager, &self.config).await
            }
        }
    }

    async fn record_status(&self, build_id: &BuildId, status: BuildStatus) -> Result<(), BuildError> {
        self.records
            .record_status(build_id, status)
            .await
            .map_err(|source| BuildError::Record {
                build_id: build_id.to_string(),
                source,
            })
    }

    fn outcome(ctx: &BuildContext, failure: Option<(Stage, String)>) -> BuildOutcome {
        let (status, failed_stage, error) = match failure {
            Some((stage, error)) => (BuildStatus::Failed, Some(stage), Some(error)),
            None => (BuildStatus::Completed, None, None),
        };
        BuildOutcome {
            build_id: ctx.build_id.clone(),
            status,
            failed_stage,
            error,
            artifact: ctx.artifact.clone(),
            merge_warnings: ctx
                .merged
                .as_ref()
                .map(|merged| merged.warnings.clone())
                .unwrap_or_default(),
            lint_warnings: ctx
                .lint
                .iter()
                .flat_map(|lint| &lint.warnings)
                .map(ToString::to_string)
                .collect(),
        }
    }
}
