use clap::{Parser, Subcommand};
use headroom_core::{Category, CompressionLevel};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "headroom")]
#[command(version)]
#[command(about = "Keep a bounded working context inside its budget")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default headroom.json into the data directory
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Check budget pressure for a usage amount or a file
    Status {
        /// Usage in budget units
        #[arg(short, long, conflicts_with = "file")]
        usage: Option<u64>,

        /// Measure this file's content (re-checks the last snapshot if neither is given)
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Run one compression pass over a file (stdin if omitted)
    Compress {
        /// Content to compress
        file: Option<String>,

        /// none, light, moderate, aggressive or maximum (defaults to the tier's level)
        #[arg(short, long)]
        level: Option<CompressionLevel>,

        /// Compress even below the pressure threshold
        #[arg(long)]
        force: bool,

        /// Write compressed content here instead of into the JSON output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Active task description used for relevance scoring
        #[arg(short, long)]
        task: Option<String>,

        /// Extra task keyword (repeatable)
        #[arg(short = 'k', long = "keyword")]
        keywords: Vec<String>,
    },

    /// Restore removed segments in compressed content
    Expand {
        /// Compressed content (stdin if omitted)
        file: Option<String>,

        /// Use the latest manifest recorded for this original-content hash
        #[arg(long)]
        original: Option<String>,

        /// Only expand this category (repeatable or comma-separated)
        #[arg(short, long = "category", value_delimiter = ',')]
        categories: Vec<Category>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the content stored before the pass that compressed HASH
    Rollback {
        hash: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the usage trend over recent snapshots
    Trend {
        /// Number of snapshots to consider
        #[arg(short, long, default_value_t = 5)]
        window: usize,
    },

    /// Execute a JSON array of operations (stdin if omitted)
    Batch { file: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_takes_positional_file() {
        let cli = Cli::try_parse_from(["headroom", "compress", "notes.txt", "--level", "moderate"])
            .unwrap();
        match cli.command {
            Commands::Compress { file, level, .. } => {
                assert_eq!(file.as_deref(), Some("notes.txt"));
                assert_eq!(level, Some(CompressionLevel::Moderate));
            }
            _ => panic!("expected compress"),
        }
    }

    #[test]
    fn test_expand_positional_file_and_categories() {
        let cli = Cli::try_parse_from([
            "headroom",
            "expand",
            "compressed.txt",
            "--category",
            "tool_result",
            "-c",
            "historical,boilerplate",
        ])
        .unwrap();
        match cli.command {
            Commands::Expand {
                file, categories, ..
            } => {
                assert_eq!(file.as_deref(), Some("compressed.txt"));
                assert_eq!(
                    categories,
                    vec![Category::ToolResult, Category::Historical, Category::Boilerplate]
                );
            }
            _ => panic!("expected expand"),
        }
    }

    #[test]
    fn test_compress_reads_stdin_without_file() {
        let cli = Cli::try_parse_from(["headroom", "compress", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Compress {
                file: None,
                force: true,
                ..
            }
        ));
    }
}
