mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    restassay::logger::init_logger();

    let cli = Cli::parse();
    let passed = match cli.command {
        Commands::Run(args) => cli::run(args).await?,
        Commands::List { files } => {
            cli::list(&files)?;
            true
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
