//! Rendering conversation history into backend payloads.

use orch_core::ChatTurn;

/// `"ROLE: content"` lines, oldest first.
pub fn render_transcript(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.to_string().to_uppercase(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix a single-string prompt with earlier turns.
///
/// Single-string backends have no multi-turn structure, so history is
/// flattened into a textual preamble. An empty history leaves the prompt
/// untouched.
pub fn prompt_with_history(history: &[ChatTurn], prompt: &str) -> String {
    if history.is_empty() {
        return prompt.to_string();
    }
    format!(
        "Context from earlier conversation:\n{}\n\nCurrent request:\n{}",
        render_transcript(history),
        prompt
    )
}

/// Stored history followed by the caller's turns.
pub fn chat_with_history(history: Vec<ChatTurn>, turns: &[ChatTurn]) -> Vec<ChatTurn> {
    let mut combined = history;
    combined.extend_from_slice(turns);
    combined
}
