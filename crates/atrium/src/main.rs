//! Binary entry point for the Atrium realm server.

#[tokio::main]
async fn main() {
    if let Err(e) = atrium::init().await {
        eprintln!("❌ Fatal error: {e}");
        std::process::exit(1);
    }
}
