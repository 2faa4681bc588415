// src/main.rs

use evalflow::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("evalflow error: {err:?}");
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        eprintln!("evalflow error: {err}");
        std::process::exit(err.exit_code());
    }
}
