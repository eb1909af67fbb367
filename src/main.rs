use anyhow::Result;
use clap::Parser;

use civiscan::cli::SubCommandExtend;
use civiscan::config::{Opts, SubCommand};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Server(cmd) => cmd.run(&opts).await,
        SubCommand::Detect(cmd) => cmd.run(&opts).await,
    }
}
