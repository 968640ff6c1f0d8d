use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use review_insights::{build_dashboard, init_logging, open_dataset, open_tables, Config};
#[cfg(feature = "tui")]
use review_insights::ui;

enum Command {
    Ui,
    Report { markdown: bool },
    Export { dir: PathBuf },
    Tables,
}

fn parse_args(args: &[String], mut config: Config) -> Result<(Command, Config)> {
    let mut command = None;
    let mut markdown = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => {
                let path = iter.next().context("--db needs a path")?;
                config = config.with_db_path(path);
            }
            "--markdown" => markdown = true,
            "--json" => markdown = false,
            "ui" | "report" | "export" | "tables" if command.is_none() => {
                command = Some(arg.clone())
            }
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => positional.push(other.to_string()),
        }
    }

    let command = match command.as_deref() {
        None | Some("ui") => Command::Ui,
        Some("report") => Command::Report { markdown },
        Some("export") => Command::Export {
            dir: positional
                .first()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("export")),
        },
        Some("tables") => Command::Tables,
        Some(other) => bail!("Unknown command: {}", other),
    };

    Ok((command, config))
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (command, config) = parse_args(&args, Config::from_env())?;

    init_logging(&config);

    match command {
        Command::Ui => run_ui_mode(config),
        Command::Report { markdown } => run_report(&config, markdown),
        Command::Export { dir } => run_export(&config, &dir),
        Command::Tables => run_tables(&config),
    }
}

fn run_report(config: &Config, markdown: bool) -> Result<()> {
    let dataset = open_dataset(&config.db_path)
        .with_context(|| format!("Failed to load review store {:?}", config.db_path))?;
    let dashboard = build_dashboard(&dataset, config);

    if markdown {
        println!("{}", dashboard.to_markdown());
    } else {
        println!("{}", dashboard.to_json()?);
    }

    Ok(())
}

fn run_export(config: &Config, dir: &std::path::Path) -> Result<()> {
    println!("📤 Exporting result tables");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let dataset = open_dataset(&config.db_path)
        .with_context(|| format!("Failed to load review store {:?}", config.db_path))?;
    println!("✓ Loaded {} reviews", dataset.reviews().len());

    let dashboard = build_dashboard(&dataset, config);
    let written = dashboard
        .write_csv_dir(dir)
        .with_context(|| format!("Failed to write exports to {:?}", dir))?;

    for path in &written {
        println!("✓ {}", path.display());
    }
    println!("\n✅ Exported {} tables", written.len());

    Ok(())
}

fn run_tables(config: &Config) -> Result<()> {
    let tables = open_tables(&config.db_path)
        .with_context(|| format!("Failed to open review store {:?}", config.db_path))?;

    println!("🗄️  {}", config.db_path.display());
    for (name, table) in &tables {
        println!("  {:<16} {:>8} rows  [{}]", name, table.len(), table.columns.join(", "));
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: Config) -> Result<()> {
    println!("🖥️  Loading Review Insights UI...\n");

    if !config.db_path.exists() {
        eprintln!("❌ Review store not found at {:?}", config.db_path);
        eprintln!("   Set REVIEWS_DB or pass --db <path>.");
        std::process::exit(1);
    }

    println!("📊 Loading reviews...");
    let dataset = open_dataset(&config.db_path)
        .with_context(|| format!("Failed to load review store {:?}", config.db_path))?;
    println!("✓ Loaded {} reviews\n", dataset.reviews().len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(dataset, config);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use web UI: cargo run --bin review-server --features server");
    std::process::exit(1);
}
