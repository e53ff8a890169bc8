//! PMem MLC Bench - command-line entry point

use clap::Parser;
use pmem_mlc_bench::{app::App, cli::Cli, config::load_config, error::Result, PKG_NAME, VERSION};
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Partial result files are left in place. Check for a leftover mlc process before the next run.");
        process::exit(99);
    }));

    let cli = Cli::parse();

    if cli.should_show_topic_help() {
        println!("{}", cli.display_help());
        return;
    }

    let use_color = cli.use_colors();

    if let Err(e) = run_application(cli).await {
        eprintln!("{}", e.format_for_console(use_color));
        eprintln!();
        eprintln!("{}", e.user_friendly_message());
        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> Result<()> {
    let debug = cli.debug;
    if debug {
        eprintln!("{} v{}", PKG_NAME, VERSION);
        eprintln!(
            "Built {} from commit {}",
            option_env!("BUILD_TIME").unwrap_or("unknown"),
            option_env!("GIT_COMMIT").unwrap_or("unknown")
        );
        eprintln!();
    }

    let config = load_config(cli)?;
    let app = App::new(config);
    if debug {
        eprintln!("Session: {}\n", app.session_id());
    }

    app.run().await?;
    Ok(())
}
