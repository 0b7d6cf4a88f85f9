use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tripwire::config::{self, Config};
use tripwire::debugger::BreakpointRegistry;
use tripwire::ui::session::Session;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default is ~/.config/tripwire/config.toml)
    #[arg(long, env = "TW_CONFIG")]
    config: Option<PathBuf>,

    /// Disable library logging
    #[arg(short, long)]
    quiet: bool,

    /// Session script, commands are read from stdin if omitted
    script: Option<PathBuf>,
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    if args.quiet {
        tripwire::log::disable();
    }
    if let Some(cfg) = Config::from_file(args.config.as_deref()) {
        config::set(cfg);
    }

    let mut session = Session::new(Arc::new(BreakpointRegistry::new()), io::stdout().lock());
    let failed = match args.script {
        Some(path) => {
            let script = File::open(&path)
                .with_context(|| format!("open session script {}", path.display()))?;
            session.run(BufReader::new(script))?
        }
        None => session.run(io::stdin().lock())?,
    };

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
