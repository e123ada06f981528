//! CLI helper functions

use crate::{
    config::{ParameterSet, PluginSelection, TransferJob, parse_parameters},
    etl::{Adapter, TransferResult, TransferStatus},
    registry::{Capability, Registry},
};
use eyre::{Context, Result, bail};
use owo_colors::OwoColorize;
use std::fmt::Write;

/// Exit status for a finished transfer
pub fn exit_code(result: &TransferResult) -> i32 {
    match result.status() {
        TransferStatus::Success => 0,
        TransferStatus::Failed => 2,
        TransferStatus::PartialFailure => 3,
    }
}

/// Build the effective job: flags override the job file, which overrides
/// the `TRANSFER_*` environment variables
pub fn resolve_job(flags: TransferJob, job_file: Option<&str>) -> Result<TransferJob> {
    let from_file = match job_file {
        Some(path) => {
            log::debug!("Reading job file {}", path);
            TransferJob::read(path)?
        }
        None => TransferJob::default(),
    };
    Ok(flags.or(from_file).or(TransferJob::from_env()))
}

/// Registered plugins grouped by capability
pub fn plugin_overview(registry: &Registry) -> String {
    let mut overview = String::new();
    for capability in Capability::ALL {
        let _ = writeln!(overview, "Available {}s:", capability);
        for name in registry.names(capability) {
            let _ = writeln!(overview, "  {}", name.cyan());
        }
    }
    overview
}

/// Help text of every plugin registered under `name`
pub fn describe_plugin(registry: &Registry, name: &str) -> Result<String> {
    let sections: Vec<String> = Capability::ALL
        .into_iter()
        .filter_map(|capability| {
            registry
                .help(capability, name)
                .map(|help| format!("{} ({})\n{}", name.green(), capability, help))
        })
        .collect();

    if sections.is_empty() {
        bail!("No plugin named '{}' is registered", name);
    }
    Ok(sections.join("\n\n"))
}

/// Parse a selection's parameter string and expand `${VAR}` references
fn parameters_for(
    registry: &Registry,
    capability: Capability,
    selection: &PluginSelection,
) -> Result<ParameterSet> {
    let parsed = parse_parameters(&selection.parameters).and_then(|mut params| {
        params.expand_env()?;
        Ok(params)
    });
    parsed.map_err(|e| {
        if let Some(help) = registry.help(capability, &selection.name) {
            log::info!("{}", help);
        }
        eyre::Report::new(e).wrap_err(format!("Invalid {} parameters", capability))
    })
}

/// Close an adapter whose transfer never started
fn release<A: Adapter + ?Sized>(adapter: &mut A) {
    if let Err(e) = adapter.close() {
        log::warn!("Failed to close {}: {}", adapter.name(), e);
    }
}

/// Resolve, initialize and run one transfer
///
/// Configuration problems (blank selections, unregistered plugins, malformed
/// parameters, failed initialization) are returned as errors before anything
/// is read. Once the manager starts, the outcome is the [`TransferResult`].
pub async fn run_transfer(registry: &Registry, job: &TransferJob) -> Result<TransferResult> {
    let blank = job.blank_selections();
    if !blank.is_empty() {
        log::info!("{}", plugin_overview(registry));
        bail!("No {} selected", blank.join(", "));
    }

    log::debug!("Checking if manager and plugins are registered");
    let missing = registry.missing(&[
        (Capability::Manager, job.manager.name.as_str()),
        (Capability::Input, job.input.name.as_str()),
        (Capability::Output, job.output.name.as_str()),
    ]);
    if !missing.is_empty() {
        for e in &missing {
            log::error!("{}", e);
        }
        log::info!("{}", plugin_overview(registry));
        let reasons: Vec<String> = missing.iter().map(ToString::to_string).collect();
        bail!(reasons.join("; "));
    }

    log::debug!("Reading plugin parameters");
    let manager_params = parameters_for(registry, Capability::Manager, &job.manager)?;
    let input_params = parameters_for(registry, Capability::Input, &job.input)?;
    let output_params = parameters_for(registry, Capability::Output, &job.output)?;

    let mut input = registry.resolve_input(&job.input.name)?;
    if let Err(e) = input.init(&input_params).await {
        log::info!("{}", input.help());
        release(&mut *input);
        return Err(e).wrap_err(format!("Failed to initialize {}", job.input.name));
    }

    let mut output = registry.resolve_output(&job.output.name)?;
    if let Err(e) = output.init(&output_params).await {
        log::info!("{}", output.help());
        release(&mut *input);
        release(&mut *output);
        return Err(e).wrap_err(format!("Failed to initialize {}", job.output.name));
    }

    let mut manager = registry.resolve_manager(&job.manager.name)?;
    if let Err(e) = manager.init(&manager_params).await {
        log::info!("{}", manager.help());
        release(&mut *input);
        release(&mut *output);
        release(&mut *manager);
        return Err(e).wrap_err(format!("Failed to initialize {}", job.manager.name));
    }

    log::info!(
        "Transferring from {} to {}",
        job.input.name.bright_black(),
        job.output.name.bright_black()
    );
    let result = manager.transfer(input, output).await;
    release(&mut *manager);

    match result.status() {
        TransferStatus::Success => log::info!("{}", result),
        TransferStatus::PartialFailure => log::warn!("{}", result),
        TransferStatus::Failed => log::error!("{}", result),
    }
    Ok(result)
}

/// Write the effective job to a YAML file for later `--job` runs
pub fn save_job(job: &TransferJob, path: &str) -> Result<()> {
    job.write(path)
        .with_context(|| format!("Failed to save job to {}", path))?;
    log::info!("Job saved to {}", path.bright_black());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::DEFAULT_TRANSFER_MANAGER;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&TransferResult::success(1)), 0);
        assert_eq!(exit_code(&TransferResult::partial(1, 1)), 3);
        assert_eq!(exit_code(&TransferResult::failed("boom", 0)), 2);
    }

    #[test]
    fn test_overview_lists_every_capability() {
        let overview = plugin_overview(Registry::builtin());
        assert!(overview.contains("Available transfer managers:"));
        assert!(overview.contains(DEFAULT_TRANSFER_MANAGER));
        assert!(overview.contains("CSV_OUTPUT_PLUGIN"));
    }

    #[test]
    fn test_describe_unknown_plugin() {
        assert!(describe_plugin(Registry::builtin(), "XML_INPUT_PLUGIN").is_err());
        let help = describe_plugin(Registry::builtin(), "CSV_INPUT_PLUGIN").unwrap();
        assert!(help.contains("hasheader"));
    }

    #[tokio::test]
    async fn test_unregistered_plugins_are_all_reported() {
        let job = TransferJob::new(
            PluginSelection::new(DEFAULT_TRANSFER_MANAGER, "stopOnItemError=true"),
            PluginSelection::new("XML_INPUT_PLUGIN", "a=b"),
            PluginSelection::new("XML_OUTPUT_PLUGIN", "a=b"),
        );
        let err = run_transfer(Registry::builtin(), &job).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("input plugin 'XML_INPUT_PLUGIN'"));
        assert!(message.contains("output plugin 'XML_OUTPUT_PLUGIN'"));
    }

    #[tokio::test]
    async fn test_blank_selection_is_rejected() {
        let job = TransferJob::new(
            PluginSelection::new(DEFAULT_TRANSFER_MANAGER, "stopOnItemError=true"),
            PluginSelection::default(),
            PluginSelection::new("CSV_OUTPUT_PLUGIN", "a=b"),
        );
        let err = run_transfer(Registry::builtin(), &job).await.unwrap_err();
        assert!(err.to_string().contains("input plugin"));
    }
}
