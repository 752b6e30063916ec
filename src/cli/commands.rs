use clap::Subcommand;

use super::check::CheckArgs;
use super::providers::ProvidersArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Submit a prompt against a page fixture and extract the response
    Run(RunArgs),

    /// List registered providers and their profiles
    Providers(ProvidersArgs),

    /// Validate configuration and, optionally, a page fixture
    Check(CheckArgs),
}
