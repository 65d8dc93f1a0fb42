//! Final payload assembly and per-kind dispatch.

use crate::structured::schema_instruction;
use errors::BackendError;
use orch_core::{
    BackendAdapter, BackendResult, ChatTurn, ExpectedSchema, RequestOptions, RequestPayload, Role
};

/// Payload actually sent to a backend: memory context prepended, schema
/// instruction appended. Non-text kinds pass through untouched.
pub fn assemble(
    payload: &RequestPayload,
    history: &[ChatTurn],
    schema: Option<&ExpectedSchema>
) -> RequestPayload {
    match payload {
        RequestPayload::Prompt { prompt } => {
            let mut prompt = memory::prompt_with_history(history, prompt);
            if let Some(schema) = schema {
                prompt.push_str(&schema_instruction(schema));
            }
            RequestPayload::Prompt { prompt }
        }
        RequestPayload::Chat { turns } => {
            let mut turns = turns.clone();
            if let Some(schema) = schema {
                append_instruction(&mut turns, &schema_instruction(schema));
            }
            RequestPayload::Chat {
                turns: memory::chat_with_history(history.to_vec(), &turns)
            }
        }
        other => other.clone()
    }
}

/// Appends to the caller's last user turn, or adds one when there is none.
fn append_instruction(turns: &mut Vec<ChatTurn>, instruction: &str) {
    match turns.iter_mut().rev().find(|t| t.role == Role::User) {
        Some(turn) => turn.content.push_str(instruction),
        None => turns.push(ChatTurn::user(instruction.trim_start()))
    }
}

/// Turns for a streamed call. Prompts become a single user turn.
pub fn stream_turns(payload: &RequestPayload) -> Option<Vec<ChatTurn>> {
    match payload {
        RequestPayload::Prompt { prompt } => Some(vec![ChatTurn::user(prompt.clone())]),
        RequestPayload::Chat { turns } => Some(turns.clone()),
        _ => None
    }
}

/// Text a repair prompt should restate.
pub fn original_input(payload: &RequestPayload) -> String {
    match payload {
        RequestPayload::Prompt { prompt } => prompt.clone(),
        RequestPayload::Chat { turns } => memory::render_transcript(turns),
        RequestPayload::Image { prompt } => prompt.clone(),
        RequestPayload::Embedding { input } => input.texts().join("\n"),
        RequestPayload::Transcription { audio_path } => audio_path.display().to_string(),
        RequestPayload::Speech { text } => text.clone()
    }
}

/// Invoke the adapter operation matching the payload variant.
pub async fn dispatch(
    adapter: &dyn BackendAdapter,
    payload: &RequestPayload,
    options: &RequestOptions
) -> Result<BackendResult, BackendError> {
    match payload {
        RequestPayload::Prompt { prompt } => adapter.complete(prompt, options).await,
        RequestPayload::Chat { turns } => adapter.chat(turns, options).await,
        RequestPayload::Image { prompt } => adapter.generate_image(prompt, options).await,
        RequestPayload::Embedding { input } => adapter.embed_text(input, options).await,
        RequestPayload::Transcription { audio_path } => {
            adapter.transcribe_audio(audio_path, options).await
        }
        RequestPayload::Speech { text } => adapter.text_to_speech(text, options).await
    }
}
