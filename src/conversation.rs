use chrono::Local;

pub const GREETING: &str = "Hello! How can i help you with sports today?";
pub const CLEARED_GREETING: &str =
    "Chat cleared! 🧹 Ready to answer your sports questions. What would you like to know?";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

impl Role {
    /// Label used in the chat window and in exported transcripts.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Bot => "Sports Assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    pub sources: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: timestamp.into(),
            sources: Vec::new(),
        }
    }

    pub fn bot(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            role: Role::Bot,
            content: content.into(),
            timestamp: timestamp.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

/// Ordered chat thread.
///
/// Messages are only ever appended, except that the most recent bot message
/// may have its content replaced while a streamed answer arrives, and the
/// whole thread may be reset to a single greeting.
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::bot(GREETING, timestamp)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Rewrites the content of the last message if it was authored by the bot.
    ///
    /// Returns `false` and leaves the thread untouched otherwise.
    pub fn replace_last_bot_content(&mut self, content: impl Into<String>) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Bot => {
                last.content = content.into();
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self, timestamp: impl Into<String>) {
        self.messages = vec![Message::bot(CLEARED_GREETING, timestamp)];
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub fn timestamp_now() -> String {
    Local::now().format("%-I:%M:%S %p").to_string()
}
