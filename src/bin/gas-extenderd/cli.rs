use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "gas-extenderd", author, about = "GPU-aware scheduler extender daemon")]
pub struct GasExtenderd {
    /// The configuration file to use
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the listen address (host:port)
    #[arg(short, long)]
    pub listen: Option<String>,

    #[command(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}
