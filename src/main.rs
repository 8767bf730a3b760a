mod ntf_config;
mod ntf_controllers;
mod ntf_countdown;
mod ntf_directory;
mod ntf_models;
mod ntf_selection;
mod ntf_views;

use clap::Parser;
use env_logger::Env;
use ntf_config::Config;
use ntf_controllers::NTFControllers;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Set up panic hook for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("❌ APPLICATION PANIC");
        eprintln!("{}", "═".repeat(70));
        eprintln!("\n{}", panic_info);
        eprintln!("\n💡 Run again with -l debug and report this issue if it persists");
        eprintln!("{}", "═".repeat(70));
    }));

    let config = Config::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str())).init();

    NTFControllers::run(config).await
}
