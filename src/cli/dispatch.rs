use super::check::cmd_check;
use super::env::CliArgs;
use super::providers::cmd_providers;
use super::run::cmd_run;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, &cli.output).await,
        Commands::Providers(args) => cmd_providers(args, ctx, &cli.output).await,
        Commands::Check(args) => cmd_check(args, ctx, &cli.output).await,
    }
}
