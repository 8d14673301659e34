use crate::demo::{run_catalog, run_demo, CatalogArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use job_pipeline::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Job Pipeline Tracker",
    about = "Track job applications through the hiring pipeline and chart their flow",
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
    /// Print the status catalog grouped by stage as JSON
    Catalog(CatalogArgs),
    /// Walk one application through the pipeline and print the resulting analytics
    Demo(DemoArgs),
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
        Command::Catalog(args) => run_catalog(args),
        Command::Demo(args) => run_demo(args),
    }
}
