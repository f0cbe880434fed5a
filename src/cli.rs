use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use tracing::{debug, info};

use crate::ast::{ANON_EXPR_NAME, FunctionDefinition, Item};
use crate::codegen::{self, CodegenBackendType, CodegenOptLevel};
use crate::lexer::{LexerError, tokenize};
use crate::parser::{ParserError, parse_recovering};
use crate::runtime::{EngineError, Registration, TieredConfig, TieredEngine};
use crate::utils::errors::{Diagnostic, emit_diagnostics};
use crate::utils::logger;
use crate::utils::profiler::{PhaseTiming, Profiler};
use crate::version::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "tierjit",
    version = VERSION,
    about = "Runs a program, promoting hot functions from the interpreter to native code"
)]
pub struct TierCli {
    /// Source file to execute.
    pub path: PathBuf,

    #[arg(long)]
    /// Route top-level expressions through the tiered engine instead of
    /// always interpreting them.
    pub jit: bool,

    #[arg(long, value_name = "CALLS")]
    /// Call count at which a function is compiled.
    pub threshold: Option<u64>,

    #[arg(long, value_enum)]
    /// Native code generator used for hot functions.
    pub backend: Option<CodegenBackendType>,

    #[arg(long, value_enum)]
    /// Optimization level for generated code.
    pub opt_level: Option<CodegenOptLevel>,

    #[arg(long, value_name = "FILE")]
    /// TOML file with engine settings.
    pub config: Option<PathBuf>,

    #[arg(long)]
    /// Dump the token stream before parsing.
    pub dump_tokens: bool,

    #[arg(long)]
    /// Dump the parsed AST before execution.
    pub dump_ast: bool,

    #[arg(long)]
    /// Display phase timing information.
    pub time: bool,

    #[arg(long)]
    /// Print profiler and compiled-code cache statistics after the run.
    pub stats: bool,
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = TierCli::parse();
    let stdout = io::stdout();
    run_with(&cli, &mut stdout.lock())
}

/// Executes the program named by `cli`, writing program output to `out`.
/// Diagnostics and runtime errors go to stderr.
pub fn run_with(cli: &TierCli, out: &mut impl Write) -> Result<()> {
    let config = resolve_config(cli)?;
    let mut engine = match cli.backend {
        Some(kind) => {
            let backend = codegen::create_backend(kind)
                .with_context(|| format!("cannot use the {kind:?} backend"))?;
            TieredEngine::with_backend(config, backend)
        }
        None => TieredEngine::new(config),
    };

    let source = read_source(&cli.path)?;
    let source_id = cli.path.display().to_string();
    let mut profiler = Profiler::new();

    let tokens = match profiler.record_phase("Lexing", || tokenize(&source)) {
        Ok(tokens) => tokens,
        Err(errors) => {
            emit_lexer_errors(&source_id, &source, &errors);
            bail!("lexing failed");
        }
    };

    if cli.dump_tokens {
        writeln!(out, "{}", "== Tokens ==".bold())?;
        for token in &tokens {
            writeln!(out, "{:?} @ {:?}", token.kind, token.span)?;
        }
    }

    // Malformed items are skipped; everything that parsed still runs.
    let (program, parse_errors) = profiler.record_phase("Parsing", || parse_recovering(&tokens));

    if cli.dump_ast {
        writeln!(out, "{}", "== AST ==".bold())?;
        writeln!(out, "{program:#?}")?;
    }

    profiler.record_phase("Execution", || -> Result<()> {
        for item in program.items {
            match item {
                Item::Definition(definition) => {
                    let name = definition.name().to_string();
                    let outcome = engine.register_function(definition);
                    debug!(function = %name, ?outcome, "definition registered");
                    if outcome == Registration::Replaced {
                        info!(function = %name, "function redefined");
                    }
                }
                Item::Expression(expr) => {
                    engine.register_function(FunctionDefinition::anonymous(expr));
                    let result = if cli.jit {
                        engine.execute(ANON_EXPR_NAME)
                    } else {
                        engine.interpret(ANON_EXPR_NAME)
                    };
                    match result {
                        Ok(value) => writeln!(out, "Evaluated to: {value:.6}")?,
                        Err(err) => report_runtime_error(&err),
                    }
                }
            }
        }
        Ok(())
    })?;

    if cli.time {
        print_timings(out, profiler.phases())?;
    }
    if cli.stats {
        print_stats(out, &engine)?;
    }

    if !parse_errors.is_empty() {
        emit_parser_errors(&source_id, &source, &parse_errors);
        bail!("parsing failed");
    }

    Ok(())
}

/// Defaults, then environment, then the config file, then explicit flags.
pub fn resolve_config(cli: &TierCli) -> Result<TieredConfig> {
    let mut config = TieredConfig::from_env();
    if let Some(path) = &cli.config {
        config = load_config_file(config, path)?;
    }
    if let Some(threshold) = cli.threshold {
        config = config.with_threshold(threshold);
    }
    if let Some(opt_level) = cli.opt_level {
        config = config.with_opt_level(opt_level);
    }
    Ok(config)
}

#[cfg(feature = "toml-config")]
fn load_config_file(config: TieredConfig, path: &Path) -> Result<TieredConfig> {
    config.merge_toml_file(path)
}

#[cfg(not(feature = "toml-config"))]
fn load_config_file(_config: TieredConfig, path: &Path) -> Result<TieredConfig> {
    bail!(
        "cannot load {}: rebuild with the `toml-config` feature to use --config",
        path.display()
    )
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn report_runtime_error(err: &EngineError) {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    eprintln!("{} {message}", "error:".red().bold());
}

fn print_timings(out: &mut impl Write, phases: &[PhaseTiming]) -> Result<()> {
    writeln!(out, "{}", "[Timing]".bold())?;
    let mut total = Duration::ZERO;
    for PhaseTiming { name, duration } in phases {
        writeln!(out, "{:>16}: {:>6.2} ms", name, duration.as_secs_f64() * 1000.0)?;
        total += *duration;
    }
    writeln!(out, "{:>16}: {:>6.2} ms", "Total", total.as_secs_f64() * 1000.0)?;
    Ok(())
}

fn print_stats(out: &mut impl Write, engine: &TieredEngine) -> Result<()> {
    let stats = engine.stats();
    let cache = engine.get_cache_stats();

    writeln!(out, "{}", "[Engine]".bold())?;
    writeln!(out, "{:>16}: {}", "Backend", engine.backend_name())?;
    writeln!(out, "{:>16}: {}", "Threshold", engine.config().hot_threshold)?;
    writeln!(out, "{:>16}: {}", "Functions", engine.registry().names().join(", "))?;
    writeln!(out, "{:>16}: {}", "Interpreted", stats.interpreted_calls)?;
    writeln!(out, "{:>16}: {}", "Compiled", stats.compilations)?;
    writeln!(out, "{:>16}: {}", "Cache hits", stats.cache_hits)?;
    writeln!(out, "{:>16}: {}", "Failures", stats.compile_failures)?;
    writeln!(
        out,
        "{:>16}: {} ({:.2} ms)",
        "Cached",
        cache.total_functions,
        cache.total_compile_time.as_secs_f64() * 1000.0
    )?;

    let metrics = engine.get_profiler_stats();
    if !metrics.is_empty() {
        writeln!(out, "{}", "[Profile]".bold())?;
        for metric in metrics {
            writeln!(
                out,
                "{:>16}: {} call(s), {:.3} ms",
                metric.name,
                metric.call_count,
                metric.total_time.as_secs_f64() * 1000.0
            )?;
        }
    }
    Ok(())
}

fn emit_lexer_errors(source_id: &str, source: &str, errors: &[LexerError]) {
    let diagnostics: Vec<Diagnostic> = errors
        .iter()
        .map(|err| err.to_diagnostic(source_id))
        .collect();
    emit_diagnostics(&diagnostics, source);
}

fn emit_parser_errors(source_id: &str, source: &str, errors: &[ParserError]) {
    let diagnostics: Vec<Diagnostic> = errors
        .iter()
        .map(|err| err.to_diagnostic(source_id))
        .collect();
    emit_diagnostics(&diagnostics, source);
}
