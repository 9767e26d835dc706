//! Tessel CLI

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use tessel::config::{Config, LoweringOptions};
use tessel::error::report_error;
use tessel::ir::{IrBuilder, format_ir};
use tessel::lower::Lowerer;
use tessel::script::{Script, ScriptError};
use tessel::types::{BlockType, ScalarKind, computation_type};

#[derive(Parser)]
#[command(name = "tessel", version, about = "Tessel - tile kernel lowering")]
struct Cli {
    /// Log level for diagnostics on stderr
    #[arg(long, env = "TESSEL_LOG", value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lower a JSON script and print the resulting IR
    Lower {
        /// Script file
        file: PathBuf,
        /// Configuration file (defaults to tessel.toml next to the script)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        emit: Emit,
        /// Use IEEE rounding for true division
        #[arg(long)]
        ieee_rounding: bool,
        /// Disallow tf32 in dot products
        #[arg(long)]
        no_tf32: bool,
        /// Use unsigned min/max for unsigned reductions
        #[arg(long)]
        signed_aware_reductions: bool,
    },
    /// Print the computation type of two scalar kinds
    Promote {
        lhs: ScalarKind,
        rhs: ScalarKind,
        /// Apply the division/remainder rules
        #[arg(long)]
        div_or_mod: bool,
    },
    /// Print the instructions a cast lowers to
    Cast {
        /// Source type, e.g. `int64[16]`
        from: BlockType,
        /// Destination element kind
        to: ScalarKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Emit {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn setup_logging(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}: {}",
                record.level().to_string().to_lowercase(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.log_level.into()) {
        eprintln!("Error: {e}");
    }

    let result = match cli.command {
        Command::Lower {
            file,
            config,
            emit,
            ieee_rounding,
            no_tf32,
            signed_aware_reductions,
        } => {
            let overrides = Overrides {
                ieee_rounding,
                no_tf32,
                signed_aware_reductions,
            };
            lower_file(&file, config.as_deref(), emit, overrides)
        }
        Command::Promote {
            lhs,
            rhs,
            div_or_mod,
        } => promote(&lhs, &rhs, div_or_mod),
        Command::Cast { from, to } => cast(from, &to),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Command-line flags that take precedence over `tessel.toml`
struct Overrides {
    ieee_rounding: bool,
    no_tf32: bool,
    signed_aware_reductions: bool,
}

impl Overrides {
    fn apply(&self, mut options: LoweringOptions) -> LoweringOptions {
        if self.ieee_rounding {
            options.ieee_rounding = true;
        }
        if self.no_tf32 {
            options.allow_tf32 = false;
        }
        if self.signed_aware_reductions {
            options.signed_aware_reductions = true;
        }
        options
    }
}

fn lower_file(
    path: &Path,
    config: Option<&Path>,
    emit: Emit,
    overrides: Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let options = overrides.apply(Config::discover(config, dir)?.lowering);
    log::info!("lowering {} with {options:?}", path.display());

    let script = Script::load(path)?;
    let builder = match script.lower(options) {
        Ok(builder) => builder,
        Err(e) => return Err(report_script_error(path, &script, e)),
    };

    match emit {
        Emit::Text => print!("{}", format_ir(&builder)),
        Emit::Json => println!("{}", serde_json::to_string_pretty(&builder)?),
    }
    Ok(())
}

/// Render a spanned lowering error against the script source, if it has one
fn report_script_error(path: &Path, script: &Script, error: ScriptError) -> Box<dyn std::error::Error> {
    if let (Some(source), Some(compile)) = (&script.source, error.compile_error()) {
        if compile.span().is_some() {
            report_error(&path.display().to_string(), source, compile);
        }
    }
    Box::new(error)
}

fn promote(lhs: &ScalarKind, rhs: &ScalarKind, div_or_mod: bool) -> Result<(), Box<dyn std::error::Error>> {
    let kind = computation_type(lhs, rhs, div_or_mod)?;
    println!("{kind}");
    Ok(())
}

fn cast(from: BlockType, to: &ScalarKind) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = IrBuilder::new("cast");
    let input = builder.argument("x", from);
    Lowerer::new(&mut builder, LoweringOptions::default()).cast(input, to)?;
    print!("{}", format_ir(&builder));
    Ok(())
}
