use anyhow::Result;
use clap::Parser;

use imseg::cli::SubCommandExtend;
use imseg::config::{Opts, SubCommand};

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let opts = Opts::parse();

    if opts.threads != 0 {
        rayon::ThreadPoolBuilder::new().num_threads(opts.threads).build_global()?;
    }

    match &opts.subcmd {
        SubCommand::Segment(config) => config.run(&opts),
        SubCommand::Export(config) => config.run(&opts),
    }
}
