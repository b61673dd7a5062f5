use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = specimen_gate::cli::Cli::parse();
    if let Err(e) = specimen_gate::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
