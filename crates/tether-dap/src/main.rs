use clap::Parser;

mod cli;
mod demo;

#[tokio::main]
async fn main() -> miette::Result<()> {
    cli::Cli::parse().run().await
}
