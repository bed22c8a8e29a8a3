use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;
use tfeval::{config, parse_directory, Block, FsLoader, Project, Value};

#[derive(Parser)]
#[command(name = "tfeval")]
#[command(about = "Evaluate Terraform configuration into fully resolved blocks", long_about = None)]
struct Cli {
    /// Root configuration directory
    #[arg(value_name = "PATH", default_value = ".")]
    path: PathBuf,

    /// Set a variable: --var key=value (repeatable)
    #[arg(long, value_parser = parse_key_val::<String, String>)]
    var: Vec<(String, String)>,

    /// Load variables from a .tfvars or .tfvars.json file. Can repeat.
    #[arg(long)]
    var_file: Vec<PathBuf>,

    /// Workspace name exposed as terraform.workspace
    #[arg(long)]
    workspace: Option<String>,

    /// Abort on the first unreadable or malformed file
    #[arg(long)]
    stop_on_error: bool,

    /// Settings file (default: tfeval.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "summary")]
    format: OutputFormat,
}

#[derive(Copy, Clone, ValueEnum)]
enum OutputFormat {
    /// One line per block with its source range
    Summary,
    /// Every module with its blocks and resolved values
    Json,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Some(
            config::load_config_from_path(path)?
                .ok_or_else(|| anyhow!("{} not found", path.display()))?,
        ),
        None => config::load_config().with_context(|| format!("failed to load {}", config::CONFIG_FILE))?,
    };
    let cwd = std::env::current_dir()?;
    let mut options = settings
        .map(|settings| settings.parse_options(&cwd))
        .unwrap_or_default();

    options.tfvars_paths.extend(cli.var_file.iter().cloned());
    for (key, value) in cli.var {
        options.input_vars.insert(key, Value::from(value));
    }
    if let Some(workspace) = cli.workspace {
        options.workspace = workspace;
    }
    options.stop_on_hcl_error |= cli.stop_on_error;

    let project = parse_directory(&cli.path, &FsLoader, &options)
        .with_context(|| format!("evaluating {}", cli.path.display()))?;
    for name in project.missing_vars() {
        warn!("{name} has no value and no default");
    }

    match cli.format {
        OutputFormat::Summary => print_summary(&project),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&project_json(&project))?);
        }
    }
    Ok(())
}

fn print_summary(project: &Project) {
    for module in project.modules() {
        info!("module {}", module.module_path().display());
        for block in module.blocks() {
            let range = block.range();
            println!(
                "{}\t{}:{}-{}",
                block.full_name(),
                range.filename().display(),
                range.start_line,
                range.end_line
            );
        }
    }
}

fn project_json(project: &Project) -> serde_json::Value {
    let modules: Vec<serde_json::Value> = project
        .modules()
        .iter()
        .map(|module| {
            let blocks: Vec<serde_json::Value> = module.blocks().iter().map(block_json).collect();
            serde_json::json!({
                "path": module.module_path().display().to_string(),
                "blocks": blocks,
            })
        })
        .collect();
    serde_json::json!({ "modules": modules })
}

fn block_json(block: &Block<'_>) -> serde_json::Value {
    serde_json::json!({
        "name": block.full_name(),
        "kind": block.kind().as_str(),
        "values": block.values(),
    })
}

fn parse_key_val<K, V>(s: &str) -> Result<(K, V)>
where
    K: std::str::FromStr,
    V: std::str::FromStr,
    <K as std::str::FromStr>::Err: std::fmt::Display,
    <V as std::str::FromStr>::Err: std::fmt::Display,
{
    let pos = s.find('=').ok_or_else(|| anyhow!("expected key=value"))?;
    let key = s[..pos]
        .parse()
        .map_err(|e| anyhow!("failed to parse key: {}", e))?;
    let value = s[pos + 1..]
        .parse()
        .map_err(|e| anyhow!("failed to parse value: {}", e))?;
    Ok((key, value))
}
