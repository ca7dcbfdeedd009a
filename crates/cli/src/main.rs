mod cmd;
mod util;

use argp::FromArgs;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[derive(FromArgs, PartialEq, Debug)]
/// Maintenance commands for the recipe bot, run against local checkouts and CI.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
enum SubCommand {
    Artifacts(cmd::artifacts::Args),
    Bump(cmd::bump::Args),
    Lint(cmd::lint::Args),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    let result = match args.command {
        SubCommand::Artifacts(args) => cmd::artifacts::run(args).await,
        SubCommand::Bump(args) => cmd::bump::run(args),
        SubCommand::Lint(args) => cmd::lint::run(args).await,
    };
    if let Err(e) = result {
        tracing::error!("{e:?}");
        std::process::exit(1);
    }
}
