use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use nodeflow::chart::{ChartKind, ChartRequest, render_chart};
use nodeflow::config::{self, AppConfig, EngineSettings};
use nodeflow::export::export_table;
use nodeflow::pipeline::{Dispatcher, Parameters, WorkflowDefinition, run_workflow};
use nodeflow::processing::{PayloadFormat, Table, clean, load_table, profile};
use serde_json::{Value as JsonValue, json};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Workflow engine for tabular data")]
pub struct Cli {
    /// Path to a JSON config file. Defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a workflow definition (`{"definition": {"nodes": [...], "edges": [...]}}`)
    Run {
        workflow: PathBuf,
    },
    /// Run the automatic cleaning pipeline over a CSV, JSON or XML file
    Clean {
        file: PathBuf,

        /// Write the cleaned table here; the format follows the extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Detect the type and missing count of every column
    Profile {
        file: PathBuf,
    },
    /// Apply a single named operation to a file
    Transform {
        file: PathBuf,

        /// Operation name, e.g. `filter`, `sort`, `fill_missing`
        #[arg(long)]
        op: String,

        /// Operation parameter as key=value; values that parse as JSON are used as JSON
        #[arg(long = "param", value_parser = parse_key_val)]
        param: Vec<(String, String)>,

        /// Operation parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
    },
    /// Convert a file to csv, xml or json
    Export {
        file: PathBuf,

        /// Target format. Defaults to the configured export format.
        #[arg(short, long)]
        format: Option<String>,

        /// Output file path. Prints the document in the response when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render a chart as SVG
    Chart {
        file: PathBuf,

        /// bar, line, scatter, pie or hist
        #[arg(long)]
        kind: String,

        #[arg(long)]
        x: String,

        #[arg(long)]
        y: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings and where they come from
    Show,
    /// Write the default settings to the config file
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// `config init` must work even when the current file is unreadable.
    pub fn reads_config(&self) -> bool {
        !matches!(
            self,
            Self::Config {
                action: ConfigAction::Init { .. }
            }
        )
    }
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

/// Runs one command and returns the JSON payload for the response envelope.
///
/// `config_path` is the `--config` override; `None` means the platform config directory.
pub fn run_command(
    command: Commands,
    config: &AppConfig,
    config_path: Option<&Path>,
) -> Result<JsonValue> {
    let settings = config.settings();
    match command {
        Commands::Run { workflow } => handle_run(&workflow),
        Commands::Clean { file, output } => handle_clean(&file, output.as_deref(), settings),
        Commands::Profile { file } => handle_profile(&file, settings),
        Commands::Transform {
            file,
            op,
            param,
            params,
        } => handle_transform(&file, &op, param, params.as_deref()),
        Commands::Export {
            file,
            format,
            output,
        } => {
            let format = format.unwrap_or_else(|| settings.default_export_format.clone());
            handle_export(&file, &format, output.as_deref())
        }
        Commands::Chart {
            file,
            kind,
            x,
            y,
            title,
            output,
        } => {
            let kind = ChartKind::parse(&kind)
                .with_context(|| format!("Unsupported chart kind: {kind}"))?;
            let mut request = ChartRequest::new(kind, x);
            request.y_column = y;
            if let Some(title) = title {
                request = request.with_title(title);
            }
            handle_chart(&file, &request, &output)
        }
        Commands::Config { action } => handle_config(action, config, config_path),
    }
}

fn load(path: &Path) -> Result<Table> {
    load_table(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_owned())
}

fn handle_run(workflow: &Path) -> Result<JsonValue> {
    let json = std::fs::read_to_string(workflow)
        .with_context(|| format!("Failed to read workflow: {}", workflow.display()))?;
    let definition = WorkflowDefinition::from_json(&json)?;
    let run = run_workflow(&definition)?;

    let mut payload = serde_json::to_value(&run)?;
    if let Some(map) = payload.as_object_mut() {
        map.insert("message".to_owned(), json!(run.describe()));
    }
    Ok(payload)
}

fn handle_clean(file: &Path, output: Option<&Path>, settings: &EngineSettings) -> Result<JsonValue> {
    let table = load(file)?;
    let (cleaned, report) = clean(&table, &settings.cleaning_options())?;
    tracing::info!(
        "Cleaned {}: {:?} -> {:?}",
        file.display(),
        report.original_shape,
        report.final_shape
    );

    match output {
        Some(output) => {
            let format = PayloadFormat::from_file_name(&output.to_string_lossy());
            let payload = export_table(&cleaned, format.extension(), &file_stem(output))?;
            std::fs::write(output, &payload.content)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            Ok(json!({"report": report, "output": output}))
        }
        None => Ok(json!({"report": report, "data": cleaned.to_records()})),
    }
}

fn handle_profile(file: &Path, settings: &EngineSettings) -> Result<JsonValue> {
    let table = load(file)?;
    Ok(json!({
        "shape": table.shape(),
        "columns": profile(&table, settings.detection_threshold),
    }))
}

fn handle_transform(
    file: &Path,
    op: &str,
    pairs: Vec<(String, String)>,
    params_json: Option<&str>,
) -> Result<JsonValue> {
    let mut params = match params_json {
        Some(raw) => match serde_json::from_str::<JsonValue>(raw).context("--params is not valid JSON")? {
            JsonValue::Object(map) => map,
            _ => bail!("--params must be a JSON object"),
        },
        None => Parameters::new(),
    };
    for (key, raw) in pairs {
        let value = serde_json::from_str::<JsonValue>(&raw).unwrap_or(JsonValue::String(raw));
        params.insert(key, value);
    }

    let mut dispatcher = Dispatcher::new();
    dispatcher.load("input", load(file)?)?;
    let result_id = dispatcher.apply_named("input", op, &params)?;
    let result = dispatcher.get(&result_id)?;
    Ok(json!({
        "table_id": result_id,
        "shape": result.shape(),
        "data": result.to_records(),
        "summary": dispatcher.summary(),
    }))
}

fn handle_export(file: &Path, format: &str, output: Option<&Path>) -> Result<JsonValue> {
    let table = load(file)?;
    let payload = export_table(&table, format, &file_stem(file))?;
    match output {
        Some(output) => {
            std::fs::write(output, &payload.content)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            Ok(json!({
                "filename": payload.filename,
                "mime_type": payload.mime_type,
                "output": output,
            }))
        }
        None => Ok(serde_json::to_value(&payload)?),
    }
}

fn handle_chart(file: &Path, request: &ChartRequest, output: &Path) -> Result<JsonValue> {
    let table = load(file)?;
    let image = render_chart(&table, request)?;
    std::fs::write(output, &image.svg)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(json!({"mime_type": image.mime_type, "output": output}))
}

fn handle_config(action: ConfigAction, config: &AppConfig, path: Option<&Path>) -> Result<JsonValue> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::get_config_path()?,
    };
    match action {
        ConfigAction::Show => Ok(json!({
            "path": path,
            "exists": path.exists(),
            "settings": config.settings(),
        })),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            let defaults = AppConfig::default();
            config::save_to(&defaults, &path)?;
            tracing::info!("Wrote default config to {}", path.display());
            Ok(json!({"path": path, "settings": defaults.settings()}))
        }
    }
}
