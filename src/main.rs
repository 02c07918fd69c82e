#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = variant_exams::run().await {
        eprintln!("variant-exams fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
