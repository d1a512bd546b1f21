//! Command-line front end for the degree planner.

pub mod cli_args;

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use cli_args::{Cli, Command, ConfigCommand, EditArgs, PlanArgs};
use dplan_core::config::ConfigSource;
use dplan_core::logging::{LoggingDestination, init_logging};
use dplan_core::{
    PlanInput, PlannerConfig, PlannerContext, Preferences, Transcript, apply_runtime_overrides,
    config_path, edit_schedule, load_config_from, plan_courses, requirements_for, save_config_to,
};
use serde_json::Value;
use tracing::{info, warn};

/// Parse `std::env::args` and run the selected command.
pub async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    dispatch(cli).await
}

pub async fn dispatch(cli: Cli) -> Result<(), String> {
    if let Err(err) = init_logging(LoggingDestination::FileAndStderr) {
        eprintln!("Warning: logging disabled: {err}");
    }

    let path = cli
        .overrides
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(config_path);
    let (config, source) = effective_config(&cli, &path)?;

    match cli.command {
        Command::Plan(args) => run_plan(&config, args).await,
        Command::Edit(args) => run_edit(&config, args).await,
        Command::Majors => list_majors(&config).await,
        Command::Config(cmd) => handle_config_command(cmd, &config, &path, source),
    }
}

fn effective_config(cli: &Cli, path: &Path) -> Result<(PlannerConfig, ConfigSource), String> {
    let load = load_config_from(path);
    let mut warnings = load.warnings;
    let mut config = load.config;

    let (overrides, mut override_warnings) = cli.overrides.to_runtime_overrides()?;
    warnings.append(&mut override_warnings);
    apply_runtime_overrides(&mut config, &overrides, &mut warnings);

    for warning in warnings {
        eprintln!("Warning: {warning}");
    }
    Ok((config, load.source))
}

async fn run_plan(config: &PlannerConfig, args: PlanArgs) -> Result<(), String> {
    let ctx = PlannerContext::from_config(config).map_err(|err| err.to_string())?;

    let requirements = match &args.requirements {
        Some(path) => read_json(path, "requirements")?,
        None => requirements_for(ctx.catalog.as_ref(), &args.majors)
            .await
            .map_err(|err| err.to_string())?,
    };
    let transcript: Transcript = read_optional(args.transcript.as_deref(), "transcript")?;
    let preferences: Preferences = read_optional(args.preferences.as_deref(), "preferences")?;

    let input = PlanInput {
        requirements,
        transcript,
        preferences,
        grad_year: args.grad_year,
        grad_quarter: args.grad_quarter.clone(),
    };

    let outcome = plan_courses(&ctx, input)
        .await
        .map_err(|err| err.to_string())?;
    if let Some(error) = &outcome.error {
        warn!(error = %error, "Plan finished without a schedule");
        eprintln!("Warning: {error}");
    }
    info!(
        courses = outcome.courses_to_schedule.len(),
        scheduled = outcome.schedule.is_some(),
        "Plan complete"
    );

    write_output(args.output.as_deref(), &outcome)
}

async fn run_edit(config: &PlannerConfig, args: EditArgs) -> Result<(), String> {
    let ctx = PlannerContext::from_config(config).map_err(|err| err.to_string())?;
    let schedule = read_json(&args.schedule, "schedule")?;
    let transcript: Transcript = read_optional(args.transcript.as_deref(), "transcript")?;

    let outcome = edit_schedule(&ctx, &args.instruction_text(), &schedule, &transcript).await;
    write_output(args.output.as_deref(), &outcome)?;
    if outcome.success {
        Ok(())
    } else {
        Err(outcome.message)
    }
}

async fn list_majors(config: &PlannerConfig) -> Result<(), String> {
    let ctx = PlannerContext::from_config(config).map_err(|err| err.to_string())?;
    let majors = ctx.catalog.majors().await.map_err(|err| err.to_string())?;
    if majors.is_empty() {
        println!("No majors available. Set [catalog] path in config.toml or pass --catalog.");
    }
    for major in majors {
        println!("{major}");
    }
    Ok(())
}

fn handle_config_command(
    command: ConfigCommand,
    config: &PlannerConfig,
    path: &Path,
    source: ConfigSource,
) -> Result<(), String> {
    match command {
        ConfigCommand::Show => {
            let mut shown = config.clone();
            if shown.oracle.api_key.is_some() {
                shown.oracle.api_key = Some("<redacted>".to_string());
            }
            let rendered = serde_json::to_string_pretty(&shown).map_err(|err| err.to_string())?;
            println!("{rendered}");
            Ok(())
        }
        ConfigCommand::Path => {
            let origin = match source {
                ConfigSource::File => "loaded",
                ConfigSource::Default => "not present; using defaults",
            };
            println!("{} ({origin})", path.display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists. Pass --force to overwrite it.",
                    path.display()
                ));
            }
            save_config_to(config, path).map_err(|err| err.to_string())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

/// Read and parse a JSON file, naming `what` in errors.
pub fn read_json(path: &str, what: &str) -> Result<Value, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read {what} file {path}: {err}"))?;
    serde_json::from_str(&raw).map_err(|err| format!("{what} file {path} is not valid JSON: {err}"))
}

fn read_optional<T>(path: Option<&str>, what: &str) -> Result<T, String>
where
    T: Default + serde::de::DeserializeOwned,
{
    match path {
        Some(path) => serde_json::from_value(read_json(path, what)?)
            .map_err(|err| format!("{what} file {path} has an unexpected shape: {err}")),
        None => Ok(T::default()),
    }
}

fn write_output<T: serde::Serialize>(path: Option<&str>, value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    match path {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))
                .map_err(|err| format!("Failed to write {path}: {err}"))?;
            eprintln!("Wrote {path}");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
