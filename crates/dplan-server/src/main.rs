#[tokio::main]
async fn main() {
    if let Err(err) = dplan_server::run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
