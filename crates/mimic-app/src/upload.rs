//! Document upload with bounded ingestion polling.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mimic_client::{FileClient, PollPolicy, RetryPolicy};
use mimic_common::{MimicError, PersonaId, UploadStatus};
use mimic_config::MimicConfig;

pub async fn run(
    config: &MimicConfig,
    persona: String,
    file: PathBuf,
    no_wait: bool,
) -> Result<(), MimicError> {
    let backend = crate::backend_from(config)?;
    let persona = PersonaId::new(persona);

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.bin")
        .to_string();
    let data = tokio::fs::read(&file).await?;
    println!("Uploading {filename} ({} bytes)", data.len());

    let retry = RetryPolicy {
        max_attempts: config.upload.retry_attempts,
        initial_delay: Duration::from_millis(config.upload.retry_delay_ms),
    };
    let client = FileClient::new(backend, retry);

    let job = client.upload(&persona, &filename, data).await?;
    println!("Upload accepted, job {job}");

    if no_wait {
        return Ok(());
    }

    let policy = PollPolicy {
        interval: Duration::from_millis(config.upload.poll_interval_ms),
        max_attempts: config.upload.max_poll_attempts,
    };

    let cancel = CancellationToken::new();
    let aborter = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            aborter.cancel();
        }
    });

    let status = client
        .wait_until_ready(&persona, &job, &policy, &cancel)
        .await;
    watcher.abort();

    match status {
        Ok(UploadStatus::Failed { message }) => {
            println!(
                "Ingestion failed: {}",
                message.as_deref().unwrap_or("no reason given")
            );
            std::process::exit(1);
        }
        Ok(status) => {
            println!("Ingestion finished: {status:?}");
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("Stopped waiting; the job keeps running on the backend.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
