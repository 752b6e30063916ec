pub mod app;
pub mod check;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod output;
pub mod providers;
pub mod run;
pub mod runtime;

pub use app::run;
pub use env::CliArgs;
