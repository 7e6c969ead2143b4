//! One end-to-end invocation: load, validate, aggregate, render.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use invgate_core::aggregate::aggregate;
use invgate_core::{Dataset, Domain, ValidationEngine, ValidationResult};
use tokio::task::JoinSet;

use crate::load;
use crate::report::{self, ReportFormat};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Input document; the built-in sample when `None`.
    pub input: Option<PathBuf>,
    /// Pre-computed schema-layer outcome to merge.
    pub schema_result: Option<PathBuf>,
    /// Where to write the rendered report, in addition to stdout.
    pub output: Option<PathBuf>,
    pub format: ReportFormat,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: ValidationResult,
    pub report: String,
}

impl RunOutcome {
    /// Process exit code: 0 only when every layer succeeded.
    pub fn exit_code(&self) -> u8 {
        if self.result.success {
            0
        } else {
            1
        }
    }
}

/// Validate each domain on the blocking pool and merge in domain order.
///
/// Domains are independent, so they run concurrently; results are sorted
/// back into [`Domain`] order so the merged output is deterministic.
pub async fn validate_concurrently(
    engine: &ValidationEngine,
    datasets: BTreeMap<Domain, Dataset>,
) -> anyhow::Result<ValidationResult> {
    let mut tasks = JoinSet::new();
    for (domain, dataset) in datasets {
        let engine = engine.clone();
        tasks.spawn_blocking(move || (domain, engine.validate_domain(&dataset, domain)));
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let (domain, result) = joined.context("Validation task panicked")?;
        tracing::info!(
            domain = %domain,
            violations = result.len(),
            success = result.success,
            "Domain validated",
        );
        results.push((domain, result));
    }
    results.sort_by_key(|(domain, _)| *domain);

    Ok(results
        .into_iter()
        .map(|(_, result)| result)
        .fold(ValidationResult::passed(), ValidationResult::merge))
}

/// Run the whole pipeline. Load failures are returned as errors and the
/// engine is not invoked.
pub async fn execute(options: &RunOptions) -> anyhow::Result<RunOutcome> {
    let datasets = load::load_document(options.input.as_deref())?;
    let schema = options
        .schema_result
        .as_deref()
        .map(load::load_schema_result)
        .transpose()?;

    let engine = ValidationEngine::new();
    let consistency = validate_concurrently(&engine, datasets).await?;
    let result = aggregate(schema, [consistency]);

    let report = report::render(&result, options.format).context("Failed to render report")?;
    if let Some(path) = &options.output {
        std::fs::write(path, &report)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Report written");
    }

    Ok(RunOutcome { result, report })
}
