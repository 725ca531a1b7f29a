// src/main.rs

use acfshell::{cli, logging, run};

#[tokio::main]
async fn main() {
    // Exit explicitly: a pending stdin read would otherwise hold the
    // runtime open after `serve` returns.
    let code = match run_main().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("acfshell error: {err:?}");
            1
        }
    };
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
