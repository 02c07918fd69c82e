#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = variant_exams::run_worker().await {
        eprintln!("variant-exams-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
