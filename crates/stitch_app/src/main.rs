mod cli;
mod config;
mod platform;
mod prefs;
mod replay;

use std::process::ExitCode;

use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    let verbose = args.verbose;
    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if verbose {
                for cause in err.chain().skip(1) {
                    eprintln!("  cause: {cause}");
                }
            }
            ExitCode::FAILURE
        }
    }
}
