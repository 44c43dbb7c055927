use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gzcp::{Config, compress_file};

#[derive(Parser, Debug)]
struct Cli {
    input: PathBuf,
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.output {
        Some(output_path) => Config {
            input_path: cli.input,
            output_path,
        },
        None => Config::for_file(cli.input),
    };

    compress_file(&config)?;

    println!(
        "compressed {} into {}",
        config.input_path.display(),
        config.output_path.display()
    );

    Ok(())
}
