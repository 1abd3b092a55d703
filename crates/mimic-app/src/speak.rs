//! One-shot voice synthesis: play through the output device or save
//! the audio stream to a file.

use std::path::PathBuf;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use mimic_audio::{AudioSink, WriterSink};
use mimic_client::VoiceClient;
use mimic_common::{MimicError, PersonaId};
use mimic_config::MimicConfig;

pub async fn run(
    config: &MimicConfig,
    persona: String,
    text: String,
    output: Option<PathBuf>,
) -> Result<(), MimicError> {
    let backend = crate::backend_from(config)?;
    let persona = PersonaId::new(persona);

    if let Some(path) = output {
        return save_to_file(backend, &persona, &text, &path).await;
    }

    #[cfg(feature = "playback")]
    {
        play_on_device(config, backend, persona, text).await
    }
    #[cfg(not(feature = "playback"))]
    {
        Err(mimic_common::AudioError::Unsupported(
            "this build has no audio output, pass --output to save the audio instead".into(),
        )
        .into())
    }
}

/// Write the voice stream to disk as it arrives.
async fn save_to_file(
    backend: mimic_client::Backend,
    persona: &PersonaId,
    text: &str,
    path: &std::path::Path,
) -> Result<(), MimicError> {
    let client = VoiceClient::new(backend);
    let cancel = CancellationToken::new();

    let fetch = client.fetch(persona, text, &cancel).await?;
    tracing::info!(content_type = %fetch.content_type, "saving voice stream");

    let file = std::fs::File::create(path)?;
    let mut sink = WriterSink::new(file);
    let total = write_stream(&mut sink, fetch.stream).await?;

    println!("Wrote {total} bytes to {}", path.display());
    Ok(())
}

/// Drain the body into the sink chunk by chunk, returning the byte
/// count written.
async fn write_stream<W: std::io::Write + Send>(
    sink: &mut WriterSink<W>,
    mut stream: mimic_audio::VoiceByteStream,
) -> Result<usize, MimicError> {
    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        total += chunk.len();
        sink.append(chunk).await?;
    }
    sink.finish().await?;
    Ok(total)
}

#[cfg(feature = "playback")]
async fn play_on_device(
    config: &MimicConfig,
    backend: mimic_client::Backend,
    persona: PersonaId,
    text: String,
) -> Result<(), MimicError> {
    use std::sync::Arc;

    use mimic_audio::{DeviceSink, VoiceController};

    let sink = DeviceSink::new()?;
    let mut controller = VoiceController::new(
        Arc::new(VoiceClient::new(backend)),
        sink,
        tuning_from(config),
    );

    controller.play_text(persona, text).await;
    if !wait_until_playing(&controller).await {
        controller.shutdown().await;
        return Ok(());
    }

    // blob playback end is not observable, so hand control to the user
    println!("Playing. Press Enter to stop.");
    let mut line = String::new();
    let _ = tokio::task::spawn_blocking(move || {
        std::io::stdin().read_line(&mut line).ok();
    })
    .await;

    controller.shutdown().await;
    Ok(())
}

/// Poll until the session leaves `Loading`. Returns false when it
/// ended in an error, printing the inline notice.
#[cfg(feature = "playback")]
pub(crate) async fn wait_until_playing<S: AudioSink + 'static>(
    controller: &mimic_audio::VoiceController<S>,
) -> bool {
    use mimic_audio::VoiceState;

    loop {
        match controller.state() {
            VoiceState::Loading => {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            VoiceState::Error(msg) => {
                println!("[voice unavailable: {msg}]");
                return false;
            }
            _ => return true,
        }
    }
}

/// Controller tuning from the `[voice]` config section.
#[cfg(feature = "playback")]
pub(crate) fn tuning_from(config: &MimicConfig) -> mimic_audio::VoiceTuning {
    mimic_audio::VoiceTuning {
        prime_bytes: config.voice.prime_bytes as u64,
        max_queued_chunks: config.voice.max_queued_chunks as usize,
    }
}
