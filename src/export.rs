use crate::conversation::{Conversation, Message};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

const MESSAGE_SEPARATOR: &str = "\n\n---\n\n";

pub fn render_message(message: &Message) -> String {
    let mut text = format!(
        "[{}] {}: {}",
        message.timestamp,
        message.role.label(),
        message.content
    );

    if !message.sources.is_empty() {
        text.push_str("\n\nSources:\n");
        let lines: Vec<String> = message
            .sources
            .iter()
            .map(|source| format!("- {source}"))
            .collect();
        text.push_str(&lines.join("\n"));
    }

    text
}

/// Flat text transcript, one block per message.
pub fn render_transcript(conversation: &Conversation) -> String {
    conversation
        .messages()
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join(MESSAGE_SEPARATOR)
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("sports-chat-{}.txt", date.format("%Y-%m-%d"))
}

/// Writes the transcript into `dir` and returns the path of the new file.
pub fn write_transcript(dir: &Path, conversation: &Conversation, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Unable to create export directory: {}", dir.display()))?;

    let path = dir.join(export_file_name(date));
    fs::write(&path, render_transcript(conversation))
        .with_context(|| format!("Unable to write chat export: {}", path.display()))?;

    Ok(path)
}
