use std::{fs::read_to_string, path::PathBuf, process::ExitCode, time::Instant};

use anyhow::Context;
use clap::Parser;
use sema::{
    config::{Config, FreeTypeVarBindingPolicy},
    errors::errors::Error,
    logging::init_logging,
    parser::parser::parse_module,
    render_error,
    scope::scoped_program::ScopedProgram,
    type_checker::type_checker::TypeChecker,
};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Checks the semantics of a module", long_about = None)]
struct Cli {
    /// Source files making up the module
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,

    /// Module name (overrides the config file)
    #[arg(short, long)]
    module: Option<String>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the checked program as JSON
    #[arg(long)]
    dump_ast: bool,

    /// Leave unsolved type variables free instead of reporting them
    #[arg(long)]
    keep_free_type_vars: bool,

    /// Report `return;` in functions with a non-unit result
    #[arg(long)]
    diagnose_missing_returns: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    init_logging("warn");
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(module) = cli.module {
        config.module_name = module;
    }
    if cli.keep_free_type_vars {
        config.free_var_binding_policy = FreeTypeVarBindingPolicy::KeepFree;
    }
    if cli.diagnose_missing_returns {
        config.diagnose_missing_return_values = true;
    }

    let mut files = vec![];
    for path in &cli.files {
        let source =
            read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        files.push((path.to_string_lossy().into_owned(), source));
    }

    let start = Instant::now();
    let ast = match parse_module(&files, &config.module_name) {
        Ok(ast) => ast,
        Err(error) => {
            display_error(&error, &files);
            return Ok(ExitCode::from(1));
        }
    };
    info!(elapsed = ?start.elapsed(), nodes = ast.len(), "parsed");

    let scope_start = Instant::now();
    let program = match ScopedProgram::new(ast) {
        Ok(program) => program,
        Err(error) => {
            eprintln!("internal compiler error: {}", error);
            return Ok(ExitCode::from(2));
        }
    };
    info!(elapsed = ?scope_start.elapsed(), "built scope tree");

    let check_start = Instant::now();
    let mut checker = TypeChecker::new(program, config);
    let success = match checker.check_program() {
        Ok(success) => success,
        Err(error) => {
            eprintln!("internal compiler error: {}", error);
            return Ok(ExitCode::from(2));
        }
    };
    info!(elapsed = ?check_start.elapsed(), total = ?start.elapsed(), "type checked");

    let checked = checker.finish();
    for error in &checked.errors {
        display_error(error, &files);
    }

    if cli.dump_ast {
        println!("{}", serde_json::to_string_pretty(&checked)?);
    }

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn display_error(error: &Error, files: &[(String, String)]) {
    let file = &error.get_position().1;
    let source = files
        .iter()
        .find(|(name, _)| name == file.as_str())
        .map_or("", |(_, source)| source.as_str());

    eprint!("{}", render_error(error, source));
}
