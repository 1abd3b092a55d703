//! Interactive chat loop. Tokens are printed as they arrive; Ctrl-C
//! aborts the in-flight reply without leaving the session.

use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mimic_client::{ChatClient, ChatEvent, ChatOptions, ChatStatus};
use mimic_common::{ChatMessage, ChatRole, MimicError, PersonaId, ThreadId};
use mimic_config::MimicConfig;

pub async fn run(
    config: &MimicConfig,
    persona: String,
    thread: Option<String>,
    speak: bool,
) -> Result<(), MimicError> {
    let backend = crate::backend_from(config)?;
    let client = ChatClient::new(
        backend.clone(),
        ChatOptions {
            model: config.chat.model.clone(),
            k: config.chat.k,
            error_fallback_text: config.chat.error_fallback_text.clone(),
        },
    );

    let persona = PersonaId::new(persona);
    let mut thread_id = thread.map(ThreadId::new);

    #[cfg(feature = "playback")]
    let mut voice = if speak {
        Some(build_voice(config, backend)?)
    } else {
        None
    };
    #[cfg(not(feature = "playback"))]
    if speak {
        eprintln!("This build has no audio output; --speak is ignored.");
    }

    println!("Chatting with {persona}. Type 'history' for the transcript, 'exit' or Ctrl-D to leave.");

    let mut transcript: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.ok().flatten() else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }
        if question == "history" {
            for message in &transcript {
                let who = match message.role {
                    ChatRole::User => "you",
                    ChatRole::Assistant => persona.as_str(),
                };
                println!("{who}: {}", message.content);
            }
            continue;
        }

        transcript.push(ChatMessage::user(question));

        let cancel = CancellationToken::new();
        let aborter = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                aborter.cancel();
            }
        });

        let result = client
            .stream_message(&persona, question, thread_id.as_ref(), &cancel, |event| {
                if let ChatEvent::Token(text) = event {
                    print!("{text}");
                    std::io::stdout().flush().ok();
                }
            })
            .await;
        watcher.abort();
        println!();

        let session = match result {
            Ok(session) => session,
            Err(e) if e.is_cancelled() => {
                println!("(cancelled)");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if session.status() == ChatStatus::Error {
            // partial tokens may already be on screen; show the final
            // text the session settled on
            println!("{}", session.content());
        }
        transcript.push(ChatMessage::assistant(session.content()));

        for citation in session.citations() {
            let source = citation.source.as_deref().unwrap_or("unknown source");
            match citation.page {
                Some(page) => println!("  [{}] {source}, p.{page}", citation.id),
                None => println!("  [{}] {source}", citation.id),
            }
        }

        if let Some(new_thread) = session.thread_id() {
            if thread_id.as_ref() != Some(new_thread) {
                debug!(thread = %new_thread, "conversation thread established");
                thread_id = Some(new_thread.clone());
            }
        }

        #[cfg(feature = "playback")]
        if let Some(controller) = voice.as_mut() {
            if session.status() == ChatStatus::Sent && !session.content().is_empty() {
                controller
                    .play_text(persona.clone(), session.content().to_string())
                    .await;
                crate::speak::wait_until_playing(controller).await;
            }
        }
    }

    #[cfg(feature = "playback")]
    if let Some(mut controller) = voice.take() {
        controller.shutdown().await;
    }

    Ok(())
}

#[cfg(feature = "playback")]
fn build_voice(
    config: &MimicConfig,
    backend: mimic_client::Backend,
) -> Result<mimic_audio::VoiceController<mimic_audio::DeviceSink>, MimicError> {
    use std::sync::Arc;

    let sink = mimic_audio::DeviceSink::new()?;
    Ok(mimic_audio::VoiceController::new(
        Arc::new(mimic_client::VoiceClient::new(backend)),
        sink,
        crate::speak::tuning_from(config),
    ))
}
