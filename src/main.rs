#[tokio::main]
async fn main() {
    if let Err(e) = blockchain_info_proxy::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
