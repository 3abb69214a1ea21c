use clap::{Args, Parser, Subcommand};
use pdf_formfill::{
    CurrentValues, FillConfig, FillJob, FillRequest, FillService, FillStrategy, FormDocument,
    FormSchema, FsStorage, HybridFillPipeline, Location,
};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fill interactive PDF forms from a field schema and a value map
#[derive(Parser, Debug)]
#[command(name = "pdf_formfill", about = "Fill interactive PDF forms from a field schema and a value map")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill a form and store the result
    Fill(FillArgs),
    /// List the named field nodes of a PDF in resolution order
    Fields {
        /// PDF to inspect
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Args, Debug)]
struct FillArgs {
    /// Original PDF (absolute, or relative to the storage root)
    #[arg(long)]
    input: String,
    /// Field schema JSON: {"fields": [...]} or a bare array
    #[arg(long)]
    schema: PathBuf,
    /// Value map JSON: {"<field id>": value, ...}
    #[arg(long)]
    values: PathBuf,
    /// Form id, used for the default namespace
    #[arg(long, default_value = "local")]
    form_id: String,
    /// Output namespace (default: forms/<form-id>)
    #[arg(long)]
    namespace: Option<String>,
    /// Remove the interactive form from the result
    #[arg(long, overrides_with = "no_flatten")]
    flatten: bool,
    /// Keep the interactive form in the result
    #[arg(long)]
    no_flatten: bool,
    /// hybrid: draw checkbox/radio marks; direct: set their states
    #[arg(long, value_enum)]
    strategy: Option<FillStrategy>,
    /// Match field names ASCII case-insensitively
    #[arg(long)]
    ignore_case: bool,
    /// Storage root directory
    #[arg(long)]
    storage_root: Option<PathBuf>,
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl FillArgs {
    fn config(&self) -> Result<FillConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => FillConfig::load(path)?,
            None => FillConfig::default(),
        };
        if let Some(root) = &self.storage_root {
            config.storage_root = root.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if self.flatten {
            config.flatten = true;
        }
        if self.no_flatten {
            config.flatten = false;
        }
        config.ignore_case |= self.ignore_case;
        Ok(config)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(serde_json::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))?)
}

async fn fill(args: FillArgs) -> Result<(), Box<dyn Error>> {
    let config = args.config()?;
    let schema: FormSchema = read_json(&args.schema)?;
    for problem in schema.validate() {
        tracing::warn!("schema: {problem}");
    }
    let values: CurrentValues = read_json(&args.values)?;

    let storage = Arc::new(FsStorage::new(&config.storage_root));
    tracing::info!(
        root = %storage.root().display(),
        strategy = config.strategy.as_str(),
        flatten = config.flatten,
        "filling {}",
        args.input
    );
    let pipeline = HybridFillPipeline::new(storage, config.pipeline_options());
    let service = FillService::new(Arc::new(pipeline), config.max_concurrent_fills);

    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| format!("forms/{}", args.form_id));
    let job = FillJob {
        form_id: args.form_id.clone(),
        request: FillRequest {
            schema,
            values,
            source: Location::new(args.input.clone()),
            flatten: config.flatten,
            namespace,
        },
    };

    let outcome = service.fill(job).await.map_err(|e| {
        let stage = e.stage().map(|s| s.as_str()).unwrap_or("-");
        format!("fill failed [{} at {stage}]: {e}", e.kind().as_str())
    })?;
    service.shutdown().await;

    let report = &outcome.report;
    println!("{}", outcome.location);
    eprintln!(
        "text fields: {}, states: {}, marks: {}, flattened: {}",
        report.text_assigned, report.states_assigned, report.marks_drawn, report.flattened
    );
    for issue in &report.issues {
        eprintln!("  {issue}");
    }
    Ok(())
}

fn list_fields(input: &Path) -> Result<(), Box<dyn Error>> {
    let bytes = fs::read(input)?;
    let doc = FormDocument::open(&bytes)?;
    println!(
        "{} pages, interactive form: {}",
        doc.page_count(),
        doc.has_interactive_form()
    );
    for candidate in doc.candidates() {
        let value = doc.field_value(candidate.node).unwrap_or_default();
        println!("{:<10} {:?} = {:?}", candidate.source.as_str(), candidate.name, value);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pdf_formfill=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Fill(args) => fill(args).await,
        Command::Fields { input } => list_fields(&input),
    }
}
