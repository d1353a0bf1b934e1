use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shopping_list::{
    canonical_units, category_of, db, import_master_rows, load_master_csv, open_database,
    parse_ingredients, write_master_csv, write_shopping_list_csv, AppConfig, LineParser,
    ShoppingListReport, ShoppingListService,
};

#[derive(Parser)]
#[command(name = "shopping-list")]
#[command(about = "Consolidate recipe ingredients into a unit-consistent shopping list")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides storage.database_path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consolidate a master ingredient CSV
    Consolidate {
        csv: PathBuf,

        /// Write the list here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        no_conversion: bool,
    },

    /// Import a master ingredient CSV into the database
    Import { csv: PathBuf },

    /// Consolidate the items stored in the database
    List {
        #[arg(long)]
        no_conversion: bool,
    },

    /// Parse recipe text (inline, a file, or `-` for stdin) into master CSV rows
    Parse {
        input: String,

        #[arg(long)]
        dish: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the canonical units and their categories
    Units,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.storage.database_path.clone());

    match cli.command {
        Command::Consolidate { csv, output, no_conversion } => {
            run_consolidate(&config, &csv, output.as_deref(), no_conversion)
        }
        Command::Import { csv } => run_import(&db_path, &csv),
        Command::List { no_conversion } => run_list(&config, &db_path, no_conversion),
        Command::Parse { input, dish, output } => run_parse(&config, &db_path, &input, &dish, &output),
        Command::Units => {
            for unit in canonical_units() {
                println!("{:<14} {}", unit, category_of(unit));
            }
            Ok(())
        }
    }
}

fn service_for(config: &AppConfig, no_conversion: bool) -> ShoppingListService {
    let service = ShoppingListService::from_config(config);
    if no_conversion {
        service.with_unit_conversion(false)
    } else {
        service
    }
}

fn print_report(report: &ShoppingListReport) {
    for warning in &report.warnings {
        eprintln!("⚠️  Row {}: {}", warning.row, warning.message);
    }
    for entry in &report.conversion_log {
        eprintln!("🔄 {}", entry);
    }
    eprintln!(
        "✓ {} lines from {} rows ({} skipped, {} conversions)",
        report.total_items,
        report.summary.total_rows_processed,
        report.summary.rows_skipped,
        report.conversions_applied
    );
}

fn run_consolidate(config: &AppConfig, csv: &Path, output: Option<&Path>, no_conversion: bool) -> Result<()> {
    let rows: Vec<_> = load_master_csv(csv)?.iter().map(|row| row.to_raw_row()).collect();
    let report = service_for(config, no_conversion).generate_from_rows(&rows);
    print_report(&report);

    match output {
        Some(path) => write_shopping_list_csv(path, &report.items)?,
        None => db::write_shopping_list(io::stdout().lock(), &report.items)?,
    }
    Ok(())
}

fn run_import(db_path: &Path, csv: &Path) -> Result<()> {
    let rows = load_master_csv(csv)?;
    let conn = open_database(db_path)?;
    let stats = import_master_rows(&conn, &rows)?;

    println!("✓ Inserted: {} items", stats.inserted);
    println!("✓ Skipped duplicates: {}", stats.duplicates);
    println!("✓ New dishes: {}", stats.dishes_created);
    Ok(())
}

fn run_list(config: &AppConfig, db_path: &Path, no_conversion: bool) -> Result<()> {
    let conn = open_database(db_path)?;
    let items = db::list_shopping_items(&conn, db::ItemFilter::default())?;
    let report = service_for(config, no_conversion).generate_from_rows(&db::shopping_items_as_rows(&items));
    print_report(&report);
    db::write_shopping_list(io::stdout().lock(), &report.items)?;
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("Failed to read stdin")?;
        return Ok(text);
    }
    let path = Path::new(input);
    if path.is_file() {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    Ok(input.to_string())
}

fn run_parse(config: &AppConfig, db_path: &Path, input: &str, dish: &str, output: &Path) -> Result<()> {
    let text = read_input(input)?;

    // Match against stored ingredients only when a database already exists
    let existing = if db_path.exists() {
        db::existing_ingredients(&open_database(db_path)?)?
    } else {
        Vec::new()
    };

    let parsed = parse_ingredients(&LineParser::new(), &text, &existing, &config.conversion.converter())?;
    write_master_csv(output, dish, &parsed)?;
    info!(count = parsed.len(), dish, path = %output.display(), "wrote parsed ingredients");

    for ingredient in &parsed {
        let amount = match (ingredient.quantity, &ingredient.unit) {
            (Some(q), Some(u)) => format!("{} {}", shopping_list::format_quantity(q), u),
            _ => "-".to_string(),
        };
        println!("{:<24} {:<16} {}", ingredient.name, amount, ingredient.notes);
    }
    Ok(())
}
