use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sdb_core::input::BufLineReader;
use sdb_core::mock::{MockHost, MockProgram};
use sdb_core::Debugger;

#[derive(Parser)]
#[command(
    name = "sdb-demo",
    version,
    about = "Run a small script under the sdb line debugger"
)]
struct Cli {
    /// Script to debug
    program: PathBuf,
    /// Read debugger commands from a file instead of standard input
    #[arg(long, value_name = "FILE")]
    commands: Option<PathBuf>,
    /// Run without halting unless interrupted
    #[arg(long)]
    non_stop: bool,
    /// Ignore state left behind by a restarting session
    #[arg(long)]
    fresh: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("failed to determine the current directory")?;
    let (config, config_path) = sdb_config::load_for_dir(&cwd).context("failed to load sdb config")?;
    sdb_config::init_tracing(&config.logging);
    if let Some(path) = &config_path {
        tracing::info!(target: "sdb.cli", path = %path.display(), "loaded config");
    }

    let text = std::fs::read_to_string(&cli.program)
        .with_context(|| format!("failed to read {}", cli.program.display()))?;
    let file = cli.program.display().to_string();
    let mut program = MockProgram::parse(file.as_str(), &text);
    let mut host = MockHost::new();
    program.install(&mut host);

    let mut session = config.session;
    session.non_stop |= cli.non_stop;

    let mut builder = Debugger::builder()
        .config(session)
        .restart_handover(!cli.fresh);
    if let Some(path) = &cli.commands {
        let commands = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        builder = builder.input(Box::new(BufLineReader::new(BufReader::new(commands))));
    }
    let debugger = builder.build().context("failed to start the debugger")?;
    if let Err(err) = debugger.install_interrupt_handler() {
        tracing::warn!(target: "sdb.cli", error = %err, "interrupts will not reach the debugger");
    }

    tracing::debug!(target: "sdb.cli", program = %file, "starting program");
    Ok(program.run(&debugger, &mut host))
}
