//! oxide-steward CLI
//!
//! Compiles staged upgrade scripts between two definition versions.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_steward::{dialect, load_definition, DialectName, NamingOptions};
use oxide_steward_core::prelude::*;

/// Staged schema-and-data upgrade scripts from declarative definitions.
#[derive(Parser)]
#[command(name = "oxide-steward")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Old definition documents. Without any, a full build is produced.
    #[arg(long, env = "STEWARD_OLD", value_delimiter = ',')]
    old: Vec<PathBuf>,

    /// New definition documents, composed in order.
    #[arg(long, env = "STEWARD_NEW", value_delimiter = ',', required = true)]
    new: Vec<PathBuf>,

    /// Target SQL dialect.
    #[arg(short, long, env = "STEWARD_DIALECT", value_enum, default_value = "pgsql8")]
    dialect: DialectArg,

    /// Directory receiving the scripts.
    #[arg(short, long, env = "STEWARD_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// File name prefix of the scripts.
    #[arg(long, default_value = "upgrade")]
    output_prefix: String,

    /// Merge the four stages into one script.
    #[arg(long)]
    single_stage_upgrade: bool,

    /// Emit structural statements only.
    #[arg(long, conflicts_with = "only_data_sql")]
    only_schema_sql: bool,

    /// Emit data statements only.
    #[arg(long)]
    only_data_sql: bool,

    /// Restrict the diff to `schema.table` (repeatable).
    #[arg(long = "limit-to-table", value_name = "SCHEMA.TABLE")]
    limit_to_table: Vec<String>,

    /// Prefix table names with their schema where schemas are flattened.
    #[arg(long)]
    use_schema_prefix: bool,

    /// Quote every identifier.
    #[arg(long)]
    quote_all_names: bool,

    /// Split scripts after this many statements (0 disables splitting).
    #[arg(long, default_value_t = 0)]
    max_statements_per_file: usize,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Pgsql8,
    Mysql5,
}

impl From<DialectArg> for DialectName {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Pgsql8 => Self::Pgsql8,
            DialectArg::Mysql5 => Self::Mysql5,
        }
    }
}

impl Cli {
    fn diff_options(&self) -> anyhow::Result<DiffOptions> {
        let mut options = DiffOptions::new();
        if self.single_stage_upgrade {
            options = options.single_stage();
        }
        if self.only_schema_sql {
            options = options.only_schema();
        }
        if self.only_data_sql {
            options = options.only_data();
        }
        if !self.limit_to_table.is_empty() {
            let mut filter = TableFilter::new();
            for entry in &self.limit_to_table {
                filter.insert(TableFilter::parse_entry(entry)?);
            }
            options = options.with_table_filter(filter);
        }
        Ok(options)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let old = if cli.old.is_empty() {
        info!("No old definition given; producing a full build.");
        None
    } else {
        Some(load_definition(&cli.old)?)
    };
    let new = load_definition(&cli.new)?;

    let dialect = dialect(
        cli.dialect.into(),
        NamingOptions {
            quote_all_names: cli.quote_all_names,
            use_schema_prefix: cli.use_schema_prefix,
        },
    );
    let report = DiffOrchestrator::new(dialect.as_ref(), cli.diff_options()?).run(old.as_ref(), &new)?;

    for warning in &report.warnings {
        warn!("{warning}");
    }

    let output = OutputOptions::new(&cli.output_dir)
        .with_prefix(&cli.output_prefix)
        .with_max_entries_per_file(cli.max_statements_per_file);
    let written = write_scripts(&report.scripts, &output)?;
    if written.is_empty() {
        info!("Definitions are identical; no scripts written.");
    }
    for path in &written {
        println!("{}", path.display());
    }

    Ok(())
}
