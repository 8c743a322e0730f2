use clap::Parser;
use mircast_cli::{cli::Cli, commands, logging};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(err) = commands::dispatch(cli).await {
        error!(target = "mircast", error = %err, "command failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
