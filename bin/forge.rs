//! `forge` is the primary CLI binary.

use clap::Parser;
use colored::Colorize;
use ext_forge::handlers;
use ext_forge::{Cli, Command, ForgeError, ForgeResult};
use tracing_subscriber::EnvFilter;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging stays off unless RUST_LOG is set or --verbose is passed.
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        print_error(&e);
        let code = match e {
            ForgeError::Interrupted => 130,
            _ => 1,
        };
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> ForgeResult<()> {
    match cli.command {
        Command::Build(args) => handlers::build_extension(args).await,
        Command::List { archive } => handlers::list_bundle(archive),
        Command::Probe => {
            handlers::probe_sdks().await;
            Ok(())
        }
        Command::Platforms => {
            handlers::list_platforms();
            Ok(())
        }
    }
}

/// Print an error tagged with the stage that failed.
fn print_error(e: &ForgeError) {
    println!();
    match e {
        ForgeError::Build { platform, message } => {
            println!(
                "  {} Publish failed for {}",
                "error[build]".bright_red().bold(),
                platform.bright_white()
            );
            print_build_log(message);
        }
        ForgeError::BuildFailures(failures) => {
            println!(
                "  {} {} platforms failed to publish",
                "error[build]".bright_red().bold(),
                failures.len()
            );
            for failure in failures {
                match failure {
                    ForgeError::Build { platform, message } => {
                        println!();
                        println!("    {} {}", "✗".bright_red(), platform.bright_white());
                        print_build_log(message);
                    }
                    other => println!("    {} {}", "✗".bright_red(), other),
                }
            }
        }
        ForgeError::Interrupted => {
            println!(
                "  {} Build interrupted, temporary files removed",
                "error[interrupted]".bright_red().bold()
            );
        }
        _ => {
            let msg = e.to_string();
            // Drop the "<Stage> error: " prefix, the tag already says it
            let detail = msg
                .split_once(": ")
                .filter(|(prefix, _)| prefix.ends_with("error"))
                .map(|(_, rest)| rest.to_string())
                .unwrap_or(msg);

            let mut lines = detail.lines();
            println!(
                "  {} {}",
                format!("error[{}]", e.stage()).bright_red().bold(),
                lines.next().unwrap_or_default()
            );
            for line in lines {
                println!("    {}", line.dimmed());
            }
        }
    }
    println!();
}

fn print_build_log(message: &str) {
    let mut lines = message.lines();
    if let Some(first) = lines.next() {
        println!("    {}", first);
    }
    for line in lines {
        println!("      {}", line.dimmed());
    }
}

/// Initialize tracing when RUST_LOG is set or verbose output was requested.
fn init_tracing(verbose: bool) {
    let rust_log_set = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.is_empty())
        .is_some();

    if !rust_log_set && !verbose {
        return;
    }

    let env_filter = if rust_log_set {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("ext_forge=debug,forge=debug")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
