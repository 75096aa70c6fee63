#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = exam_evaluation::run().await {
        eprintln!("exam-evaluation fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
