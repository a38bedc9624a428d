use anyhow::Result;
use clap::Parser;
use explicit_labeler::cli::{execute, init_tracing, RunArgs};

#[derive(Parser)]
#[command(name = "explicit-labeler")]
#[command(about = "Mark explicit albums and tracks with [E] titles and an 'Explicit' label")]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.run.verbose);
    execute(&cli.run)?;
    Ok(())
}
