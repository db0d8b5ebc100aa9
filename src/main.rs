use clicktail::app;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match app::main().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "clicktail stopped");
            eprintln!("clicktail: {e:#}");
            ExitCode::FAILURE
        }
    }
}
