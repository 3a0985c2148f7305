use crate::demo::{run_demo, run_fee_quote, DemoArgs, FeeQuoteArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use permit_workflow::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Permit Review Service",
    about = "Run the permit review service or exercise the fee and review workflows from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Fee schedule tools
    Fees {
        #[command(subcommand)]
        command: FeesCommand,
    },
    /// Walk one application from submission to a signed approval letter
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum FeesCommand {
    /// Quote the fees for an activity and permit level
    Quote(FeeQuoteArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Fees {
            command: FeesCommand::Quote(args),
        } => run_fee_quote(args),
        Command::Demo(args) => run_demo(args),
    }
}
