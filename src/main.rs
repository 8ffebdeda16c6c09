use clap::Parser;
use peakvar::{
    cli::{init_verbose, Cli, Command, FULL_VERSION},
    commands::{assemble, call},
    utils::{handle_error_and_exit, Result},
};

fn runner() -> Result<()> {
    let cli = Cli::parse();
    init_verbose(&cli);
    let subcommand_name = match cli.command {
        Command::Call(_) => "call",
        Command::Assemble(_) => "assemble",
    };

    log::info!(
        "Running {}-{} [{}]",
        env!("CARGO_PKG_NAME"),
        *FULL_VERSION,
        subcommand_name
    );
    match cli.command {
        Command::Call(args) => call::call(args)?,
        Command::Assemble(args) => assemble::assemble(args)?,
    }
    log::info!("{} end", env!("CARGO_PKG_NAME"));
    Ok(())
}

fn main() {
    if let Err(e) = runner() {
        handle_error_and_exit(e);
    }
}
