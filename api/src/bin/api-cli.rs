use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use day0_api::config::AppConfig;
use day0_api::database::Database;
use day0_api::export::{CaseExporter, ExportFormat};
use day0_api::model::Day0Case;
use day0_api::search::{
    build_count_sql, build_fetch_sql, parse_search_query, CaseQuery, Collation, FetchWindow,
    QueryCompiler,
};
use day0_api::validation::validate_case;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "api-cli")]
#[command(about = "Day0 case service CLI for admin and debugging tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Tsv,
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => ExportFormat::Csv,
            Format::Tsv => ExportFormat::Tsv,
            Format::Json => ExportFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a search query and print the result as JSON
    Parse { query: String },
    /// Print the SQL a search query compiles to
    Explain {
        query: String,
        /// Show the count statement instead of the first page
        #[arg(long)]
        count: bool,
        /// Compare strings bytewise instead of ignoring case and accents
        #[arg(long)]
        binary: bool,
    },
    /// Upsert cases from a JSON array file
    Import {
        file: PathBuf,
        /// Curator email recorded on cases that carry none
        #[arg(long, default_value = "cli@localhost.localdomain")]
        curator: String,
    },
    /// Export cases matching a query
    Export {
        #[arg(long)]
        query: Option<String>,
        #[arg(long, value_enum, default_value = "csv")]
        format: Format,
        #[arg(long)]
        limit: Option<i64>,
        /// Output file (defaults to stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    match cli.command {
        Commands::Parse { query } => handle_parse(&query),
        Commands::Explain {
            query,
            count,
            binary,
        } => handle_explain(&query, count, binary),
        Commands::Import { file, curator } => handle_import(&file, &curator).await,
        Commands::Export {
            query,
            format,
            limit,
            output,
        } => handle_export(query.as_deref(), format.into(), limit, output).await,
    }
}

fn handle_parse(query: &str) -> Result<()> {
    let parsed = parse_search_query(query)?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

fn handle_explain(query: &str, count: bool, binary: bool) -> Result<()> {
    let collation = if binary {
        Collation::Binary
    } else {
        Collation::CaseInsensitive
    };
    let parsed = parse_search_query(query)?;
    let compiled = QueryCompiler::new(collation).compile(&parsed);
    let statement = if count {
        build_count_sql(&compiled, None)
    } else {
        build_fetch_sql(&compiled, &FetchWindow::page(1, 10))
    };
    println!("{}", serde_json::to_string_pretty(&compiled)?);
    println!("{}", serde_json::to_string_pretty(&statement)?);
    Ok(())
}

async fn open_database() -> Result<Database> {
    let config = AppConfig::from_env()?;
    Database::new(&config.database_url).await
}

async fn handle_import(file: &Path, curator: &str) -> Result<()> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
    );
    let cases: Vec<Day0Case> = serde_json::from_reader(reader)
        .with_context(|| format!("{} is not a JSON array of cases", file.display()))?;

    let mut valid = Vec::with_capacity(cases.len());
    for (index, case) in cases.into_iter().enumerate() {
        match validate_case(&case) {
            Ok(()) => valid.push(case),
            Err(e) => eprintln!("Skipping case {}: {}", index, e),
        }
    }

    let db = open_database().await?;
    let summary = db.batch_upsert_cases(&valid, curator).await?;
    println!(
        "✓ Imported {} cases ({} created, {} updated, {} unchanged)",
        summary.num_created + summary.num_updated,
        summary.num_created,
        summary.num_updated,
        summary.num_unchanged
    );
    Ok(())
}

async fn handle_export(
    query: Option<&str>,
    format: ExportFormat,
    limit: Option<i64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let compiled = match query {
        Some(q) if !q.trim().is_empty() => {
            QueryCompiler::default().compile(&parse_search_query(q)?)
        }
        _ => CaseQuery::all(Collation::default()),
    };
    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };

    let db = open_database().await?;
    let mut exporter = CaseExporter::new(writer, format)?;
    let exported = db
        .stream_cases_for_export(&compiled, limit, |case| exporter.write_case(&case))
        .await?;
    exporter.finish()?.flush()?;
    if let Some(path) = output {
        eprintln!("✓ Exported {} cases to {}", exported, path.display());
    }
    Ok(())
}
