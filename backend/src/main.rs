//! Yardload CLI - Bulk import of yard and logistics records
//!
//! # Commands
//!
//! ```bash
//! yardload serve                                  # Start HTTP server (port 3000)
//! yardload schemas                                # List known schemas
//! yardload template vehicle --format xlsx         # Write a blank upload template
//! yardload validate arrivals.csv -s vehicle       # Check an upload, write corrections
//! yardload import arrivals.xlsx -s vehicle        # Insert valid rows, write corrections
//! ```
//!
//! Settings come from `YARDLOAD_*` environment variables (or `.env`);
//! flags override them.

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yardload::{
    export_invalid_rows, import_file, submit, template, Config, ExportFile, ExportFormat,
    ImportOptions, ImportRun, MatchMode, RecordSchema, SchemaRegistry, Sink,
};

#[derive(Parser)]
#[command(name = "yardload")]
#[command(about = "Bulk import of vehicles, yard locations and transport orders", long_about = None)]
struct Cli {
    /// Directory of extra schema definitions (overrides YARDLOAD_SCHEMA_DIR)
    #[arg(long, global = true)]
    schema_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known schemas and their fields
    Schemas,

    /// Write a blank upload template
    Template {
        /// Schema name
        schema: String,

        /// csv or xlsx (default: YARDLOAD_EXPORT_FORMAT)
        #[arg(short, long, value_parser = parse_format)]
        format: Option<ExportFormat>,

        /// Output directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check an upload without inserting anything
    Validate(UploadArgs),

    /// Insert the valid rows of an upload
    Import {
        #[command(flatten)]
        upload: UploadArgs,

        /// Remote API base URL (overrides YARDLOAD_API_URL)
        #[arg(long)]
        api_url: Option<String>,

        /// Bearer token (overrides YARDLOAD_API_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Never contact the remote API
        #[arg(long)]
        dry_run: bool,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides YARDLOAD_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Args)]
struct UploadArgs {
    /// Input CSV or spreadsheet
    input: PathBuf,

    /// Schema name
    #[arg(short, long)]
    schema: String,

    /// Column matching: position or header
    #[arg(short, long = "match", value_parser = parse_match_mode, default_value = "position")]
    match_mode: MatchMode,

    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,

    /// Format of the invalid-rows file: csv or xlsx
    #[arg(short, long, value_parser = parse_format)]
    format: Option<ExportFormat>,

    /// Directory for the invalid-rows file (default: next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "yardload=info,tower_http=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if cli.schema_dir.is_some() {
        config.schema_dir = cli.schema_dir;
    }

    match cli.command {
        Commands::Schemas => cmd_schemas(&config),

        Commands::Template { schema, format, output } => {
            cmd_template(&config, &schema, format, output.as_deref())
        }

        Commands::Validate(upload) => cmd_validate(&config, &upload),

        Commands::Import { upload, api_url, token, dry_run } => {
            if api_url.is_some() {
                config.api_url = api_url;
            }
            if token.is_some() {
                config.api_token = token;
            }
            if dry_run {
                config.api_url = None;
            }
            cmd_import(&config, &upload).await
        }

        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            yardload::server::start_server(config).await
        }
    }
}

fn registry(config: &Config) -> Result<SchemaRegistry, Box<dyn std::error::Error>> {
    Ok(match &config.schema_dir {
        Some(dir) => SchemaRegistry::with_dir(dir)?,
        None => SchemaRegistry::builtin().clone(),
    })
}

fn cmd_schemas(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let registry = registry(config)?;

    eprintln!("📋 Known schemas ({}):\n", registry.len());
    for schema in registry.list() {
        println!("  📄 {}", schema.name());
        if !schema.description().is_empty() {
            println!("     {}", schema.description());
        }
        for field in schema.fields() {
            println!(
                "     - {} ({}{})",
                field.label(),
                field.kind.describe(),
                if field.required { ", required" } else { "" }
            );
        }
        println!("     Rules: {}", schema.rules().len());
        println!();
    }
    Ok(())
}

fn cmd_template(
    config: &Config,
    schema: &str,
    format: Option<ExportFormat>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = registry(config)?.require(schema)?;
    let file = template(&schema, format.unwrap_or(config.export_format))?;
    let path = write_file(&file, output.unwrap_or(Path::new(".")))?;
    eprintln!("💾 Template written to: {}", path.display());
    Ok(())
}

fn cmd_validate(config: &Config, upload: &UploadArgs) -> Result<(), Box<dyn std::error::Error>> {
    let schema = registry(config)?.require(&upload.schema)?;
    let run = read_upload(&schema, upload)?;

    print_summary(&run);
    if run.batch.is_clean() {
        eprintln!("\n✨ Ready to import!");
        return Ok(());
    }

    write_corrections(config, &schema, &run, upload)?;
    std::process::exit(1);
}

async fn cmd_import(config: &Config, upload: &UploadArgs) -> Result<(), Box<dyn std::error::Error>> {
    let schema = registry(config)?.require(&upload.schema)?;
    let mut run = read_upload(&schema, upload)?;

    let sink = Sink::from_settings(config.api_url.as_deref(), config.api_token.as_deref());
    if sink.is_dry_run() {
        eprintln!("🧪 Dry run: nothing is sent to the remote API");
    }
    let report = submit(&mut run.batch, &sink).await;

    println!("{}", serde_json::to_string_pretty(&report.inserted)?);
    print_summary(&run);

    if !run.batch.is_clean() {
        write_corrections(config, &schema, &run, upload)?;
        std::process::exit(1);
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn read_upload(schema: &RecordSchema, upload: &UploadArgs) -> Result<ImportRun, Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {} as '{}'", upload.input.display(), schema.name());

    let options = ImportOptions {
        match_mode: upload.match_mode,
        delimiter: upload.delimiter,
    };
    Ok(import_file(&upload.input, schema, &options)?)
}

fn print_summary(run: &ImportRun) {
    let batch = &run.batch;
    eprintln!("\n📊 Results: {} valid, {} invalid", batch.valid_count(), batch.invalid_count());
    if batch.skipped_blank > 0 {
        eprintln!("   Skipped blank rows: {}", batch.skipped_blank);
    }
    for row in batch.invalid.iter().take(5) {
        eprintln!("\n❌ Row {}:", row.row_number);
        for err in row.errors.iter().take(3) {
            eprintln!("   - {}", err);
        }
    }
}

fn write_corrections(
    config: &Config,
    schema: &RecordSchema,
    run: &ImportRun,
    upload: &UploadArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = upload.format.unwrap_or(config.export_format);
    let upload_name = upload.input.file_name().and_then(|n| n.to_str());
    let file = export_invalid_rows(&run.batch, schema, format, upload_name)?;

    let dir = match &upload.output {
        Some(dir) => dir.clone(),
        None => upload
            .input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let path = write_file(&file, &dir)?;
    eprintln!("\n💾 Rows to correct written to: {}", path.display());
    Ok(())
}

fn write_file(file: &ExportFile, dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let path = dir.join(&file.file_name);
    fs::write(&path, &file.bytes)?;
    Ok(path)
}

fn parse_match_mode(value: &str) -> Result<MatchMode, String> {
    MatchMode::parse(value).ok_or_else(|| format!("expected 'position' or 'header', got '{}'", value))
}

fn parse_format(value: &str) -> Result<ExportFormat, String> {
    ExportFormat::parse(value).map_err(|e| e.to_string())
}
