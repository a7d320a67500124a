mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => commands::init::run(force),
        Commands::Status { usage, file } => commands::status::run(usage, file.as_deref()),
        Commands::Compress {
            file,
            level,
            force,
            output,
            task,
            keywords,
        } => commands::compress::run(commands::compress::CompressArgs {
            file,
            level,
            force,
            output,
            task,
            keywords,
        }),
        Commands::Expand {
            file,
            original,
            categories,
            output,
        } => commands::expand::run(
            file.as_deref(),
            original.as_deref(),
            &categories,
            output.as_deref(),
        ),
        Commands::Rollback { hash, output } => commands::expand::rollback(&hash, output.as_deref()),
        Commands::Trend { window } => commands::trend::run(window),
        Commands::Batch { file } => commands::batch::run(file.as_deref()),
    }
}
