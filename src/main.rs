use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hpl::{config::Config, error::HplError, loader::Session, tokenizer::TokenType};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hpl", about = "Run HPL documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Additional directory to search for modules. May be repeated.
    #[arg(long = "module-path", global = true)]
    module_paths: Vec<PathBuf>,

    /// Directory holding installed packages.
    #[arg(long, env = "HPL_PACKAGES", global = true)]
    package_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a document and run its entry point.
    Run(RunArgs),
    /// Print the token stream of a function body.
    Tokens(TokensArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct TokensArgs {
    file: PathBuf,
}

fn main() {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let mut config = Config::default();
    if let Some(package_dir) = &cli.package_dir {
        config = config.with_package_dir(package_dir);
    }
    for path in &cli.module_paths {
        config = config.with_module_path(path);
    }

    let result = match &cli.command {
        Command::Run(args) => run_command(config, args),
        Command::Tokens(args) => tokens_command(args),
    };

    if let Err(e) = result {
        eprintln!("{}", e.report());
        std::process::exit(1);
    }
}

fn run_command(config: Config, args: &RunArgs) -> Result<(), HplError> {
    let session = Session::new(config);
    session.run_file(&args.file)?;
    Ok(())
}

fn tokens_command(args: &TokensArgs) -> Result<(), HplError> {
    let source = std::fs::read_to_string(&args.file).map_err(|e| {
        HplError::io(format!("Failed to read '{}': {e}", args.file.display()))
    })?;
    let tokens = hpl::tokenizer::tokens(&source)?;

    let mut line = 0;
    for token in tokens {
        if token.span.line != line {
            print!("{:4} ", token.span.line);
            line = token.span.line;
        } else {
            print!("   | ");
        }
        println!("{:<14} {}", format!("{:?}", token.token_type), token.lexeme);

        if token.token_type == TokenType::Eof {
            break;
        }
    }
    Ok(())
}
