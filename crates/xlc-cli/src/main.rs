//! xlc CLI
//!
//! Command-line compiler for spreadsheet config tables.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use xlc_core::{
    compile, export_dataset, pipeline, CompileOptions, CompiledDataset, Error, JsonExporter,
    MergedTable, TypeDefinition, TypeKind, TypeRegistry,
};

#[derive(Parser)]
#[command(name = "xlc")]
#[command(about = "Spreadsheet config table compiler", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every workbook and optionally export JSON data
    Build {
        /// Directory holding the workbooks
        input_dir: PathBuf,

        /// Type declaration file (defaults to <INPUT_DIR>/types.yaml)
        #[arg(short, long)]
        types: Option<PathBuf>,

        /// Write one JSON file per table plus types.json and fingerprints.json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile and validate without writing anything
    Check {
        /// Directory holding the workbooks
        input_dir: PathBuf,

        /// Type declaration file (defaults to <INPUT_DIR>/types.yaml)
        #[arg(short, long)]
        types: Option<PathBuf>,
    },

    /// Load a type declaration file and list its types
    Types {
        /// Type declaration file
        #[arg(short, long, default_value = pipeline::DEFAULT_TYPES_FILE)]
        types: PathBuf,
    },

    /// Print one compiled table
    Show {
        /// Directory holding the workbooks
        input_dir: PathBuf,

        /// Export name of the table
        #[arg(long)]
        table: String,

        /// Type declaration file (defaults to <INPUT_DIR>/types.yaml)
        #[arg(long)]
        types: Option<PathBuf>,

        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli.command) {
        report(&e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// Every collected error and diagnostic is printed, not just the first
fn report(error: &Error) {
    match error {
        Error::Phase(errors) => {
            for e in errors {
                report(e);
            }
            eprintln!("Error: {error}");
        }
        Error::Validation(diagnostics) => {
            for d in diagnostics {
                eprintln!("  {d}");
            }
            eprintln!("Error: {error}");
        }
        _ => eprintln!("Error: {error}"),
    }
}

fn run(command: Commands) -> xlc_core::Result<()> {
    match command {
        Commands::Build {
            input_dir,
            types,
            output,
        } => cmd_build(&input_dir, types, output.as_deref()),
        Commands::Check { input_dir, types } => cmd_check(&input_dir, types),
        Commands::Types { types } => cmd_types(&types),
        Commands::Show {
            input_dir,
            table,
            types,
            limit,
        } => cmd_show(&input_dir, types, &table, limit),
    }
}

fn options(input_dir: &Path, types: Option<PathBuf>) -> CompileOptions {
    let options = CompileOptions::new(input_dir);
    let options = match types {
        Some(path) => options.with_types_file(path),
        None => options,
    };
    debug!(
        input_dir = %options.input_dir.display(),
        types_file = ?options.resolved_types_file(),
        "compile options"
    );
    options
}

fn print_summary(dataset: &CompiledDataset) {
    println!(
        "Compiled {} table(s), {} row(s), {} custom type(s)",
        dataset.tables.len(),
        dataset.row_count(),
        dataset.registry.len()
    );
}

fn cmd_build(input_dir: &Path, types: Option<PathBuf>, output: Option<&Path>) -> xlc_core::Result<()> {
    let dataset = compile(&options(input_dir, types))?;
    print_summary(&dataset);

    if let Some(output_dir) = output {
        let mut exporter = JsonExporter::new(output_dir)?;
        export_dataset(&dataset, &mut exporter)?;
        let result = exporter.into_result();
        info!(
            files = result.files_written.len(),
            rows = result.rows_written,
            "json export written"
        );
        println!(
            "Exported {} file(s) to {}",
            result.files_written.len(),
            output_dir.display()
        );
    }

    Ok(())
}

fn cmd_check(input_dir: &Path, types: Option<PathBuf>) -> xlc_core::Result<()> {
    let dataset = compile(&options(input_dir, types))?;
    print_summary(&dataset);
    println!("No problems found");
    Ok(())
}

fn cmd_types(types: &Path) -> xlc_core::Result<()> {
    let registry = TypeRegistry::load_file(types)?;

    println!("Types ({}):", registry.len());
    println!();
    for def in registry.definitions() {
        println!("{}", describe_type(def));
    }

    Ok(())
}

fn describe_type(def: &TypeDefinition) -> String {
    let body = match def.kind() {
        TypeKind::Enum => def.enum_values().join(", "),
        TypeKind::Struct | TypeKind::Class => def
            .fields()
            .iter()
            .map(|f| format!("{}: {}", f.name, f.descriptor))
            .collect::<Vec<_>>()
            .join(", "),
    };
    let ignored = if def.ignore { " [ignored]" } else { "" };
    format!("  {} {} {{ {} }}{}", def.kind().as_str(), def.name, body, ignored)
}

fn cmd_show(
    input_dir: &Path,
    types: Option<PathBuf>,
    table_name: &str,
    limit: Option<usize>,
) -> xlc_core::Result<()> {
    let dataset = compile(&options(input_dir, types))?;
    let table = dataset
        .find_table(table_name)
        .ok_or_else(|| Error::TableNotFound(table_name.to_string()))?;

    print_table(table, limit);
    Ok(())
}

fn print_table(table: &MergedTable, limit: Option<usize>) {
    println!("Table: {}", table.export_name);
    println!("Source: {}", table.source.display());
    println!("Sheets: {}", table.sheets.join(", "));
    println!();

    let columns: Vec<_> = table.data_fields().collect();
    let header: Vec<String> = columns
        .iter()
        .map(|f| format!("{}:{}", f.name, f.descriptor))
        .collect();
    println!("{}", header.join("\t"));
    println!("{}", "-".repeat(header.len() * 12));

    let row_limit = limit.unwrap_or(table.rows.len());
    for row in table.rows.iter().take(row_limit) {
        let values: Vec<String> = columns
            .iter()
            .map(|f| row.get(&f.name).map(ToString::to_string).unwrap_or_default())
            .collect();
        println!("{}", values.join("\t"));
    }

    if table.rows.len() > row_limit {
        println!("... ({} more rows)", table.rows.len() - row_limit);
    }
}
