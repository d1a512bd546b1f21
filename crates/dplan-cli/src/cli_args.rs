use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use dplan_core::config::RuntimeOverrides;

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Plan the courses a student still owes and schedule them", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Supported subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve owed courses and request a timetable.
    Plan(PlanArgs),
    /// Apply a free-text edit to an existing timetable.
    Edit(EditArgs),
    /// List majors available in the configured catalog.
    Majors,
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Configuration file management.
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (API key redacted).
    Show,
    /// Print the path of config.toml.
    Path,
    /// Write the effective configuration to config.toml.
    #[command(alias = "save")]
    Init {
        /// Overwrite an existing file.
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

/// Flags that override config.toml for this run only.
#[derive(Debug, Clone, Args, Default)]
pub struct OverrideArgs {
    /// Read configuration from this file instead of the default location.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Chat-completion base URL for the decision oracle.
    #[arg(long = "oracle-url", global = true, value_name = "URL")]
    pub oracle_url: Option<String>,

    /// Model used for decision queries.
    #[arg(long = "oracle-model", global = true, value_name = "MODEL")]
    pub oracle_model: Option<String>,

    /// API key for the decision oracle.
    #[arg(long = "oracle-api-key", global = true, value_name = "KEY")]
    pub oracle_api_key: Option<String>,

    /// Per-query timeout in seconds.
    #[arg(long = "oracle-timeout", global = true, value_name = "SECS")]
    pub oracle_timeout: Option<u64>,

    /// Command line of the technical breadth recommender.
    #[arg(long = "recommender-cmd", global = true, value_name = "CMD")]
    pub recommender_cmd: Option<String>,

    /// URL of the technical breadth recommender.
    #[arg(long = "recommender-url", global = true, value_name = "URL")]
    pub recommender_url: Option<String>,

    /// Command line of the timetable engine.
    #[arg(long = "engine-cmd", global = true, value_name = "CMD")]
    pub engine_cmd: Option<String>,

    /// URL of the timetable engine.
    #[arg(long = "engine-url", global = true, value_name = "URL")]
    pub engine_url: Option<String>,

    /// Command line of the schedule edit interpreter.
    #[arg(long = "editor-cmd", global = true, value_name = "CMD")]
    pub editor_cmd: Option<String>,

    /// URL of the schedule edit interpreter.
    #[arg(long = "editor-url", global = true, value_name = "URL")]
    pub editor_url: Option<String>,

    /// Requirement catalog JSON file.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub catalog: Option<String>,
}

impl OverrideArgs {
    /// Convert CLI flags into runtime overrides plus any advisory warnings.
    pub fn to_runtime_overrides(&self) -> Result<(RuntimeOverrides, Vec<String>), String> {
        let mut warnings = Vec::new();

        if self.oracle_timeout == Some(0) {
            return Err("--oracle-timeout must be at least one second.".into());
        }

        for (flag, value) in [
            ("--recommender-url", &self.recommender_url),
            ("--engine-url", &self.engine_url),
            ("--editor-url", &self.editor_url),
            ("--oracle-url", &self.oracle_url),
        ] {
            if let Some(url) = value.as_deref().and_then(parse_optional_field) {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    warnings.push(format!("{flag} '{url}' does not look like an http(s) URL."));
                }
            }
        }

        let overrides = RuntimeOverrides {
            oracle_base_url: self.oracle_url.as_deref().and_then(parse_optional_field),
            oracle_model: self.oracle_model.as_deref().and_then(parse_optional_field),
            oracle_api_key: self.oracle_api_key.as_deref().and_then(parse_optional_field),
            oracle_timeout_secs: self.oracle_timeout,
            recommender_command: self.recommender_cmd.as_deref().and_then(parse_optional_field),
            recommender_url: self.recommender_url.as_deref().and_then(parse_optional_field),
            engine_command: self.engine_cmd.as_deref().and_then(parse_optional_field),
            engine_url: self.engine_url.as_deref().and_then(parse_optional_field),
            editor_command: self.editor_cmd.as_deref().and_then(parse_optional_field),
            editor_url: self.editor_url.as_deref().and_then(parse_optional_field),
            catalog_path: self.catalog.as_deref().and_then(parse_optional_field),
        };

        Ok((overrides, warnings))
    }
}

/// Arguments for `plan`.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Requirement tree JSON (a tree, an array of trees, or a nested tree).
    #[arg(
        short,
        long,
        value_hint = ValueHint::FilePath,
        conflicts_with = "majors",
        required_unless_present = "majors"
    )]
    pub requirements: Option<String>,

    /// Major name looked up in the catalog; repeat for a double major.
    #[arg(short, long = "major", value_name = "NAME")]
    pub majors: Vec<String>,

    /// Transcript JSON object of course key to grade.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub transcript: Option<String>,

    /// Preferences JSON object.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub preferences: Option<String>,

    /// Expected graduation year.
    #[arg(long = "grad-year", value_name = "YEAR")]
    pub grad_year: Option<i32>,

    /// Expected graduation quarter (defaults to Spring).
    #[arg(long = "grad-quarter", value_name = "QUARTER")]
    pub grad_quarter: Option<String>,

    /// Write the result here instead of stdout.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<String>,
}

/// Arguments for `edit`.
#[derive(Debug, Clone, Args)]
pub struct EditArgs {
    /// Current timetable JSON.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub schedule: String,

    /// Transcript JSON object of course key to grade.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub transcript: Option<String>,

    /// Write the result here instead of stdout.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<String>,

    /// The edit, e.g. "move MATH 32A to fall".
    #[arg(value_name = "INSTRUCTION", required = true, num_args = 1..)]
    pub instruction: Vec<String>,
}

impl EditArgs {
    pub fn instruction_text(&self) -> String {
        self.instruction.join(" ")
    }
}

fn parse_optional_field(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if matches!(
        trimmed.to_ascii_lowercase().as_str(),
        "none" | "null" | "unset"
    ) {
        None
    } else {
        Some(trimmed.to_string())
    }
}
