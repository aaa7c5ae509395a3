use crate::chat_api::{ChatAnswer, TransportError};
use crate::conversation::{timestamp_now, Conversation, Message};
use crate::settings::{ConnectionStatus, TransportMode};
use tracing::{debug, info, warn};

pub const PROMPT_SHORTCUTS: [&str; 4] = [
    "History of Cricket",
    "What are the rules of Cricket?",
    "When did Olympics start?",
    "History of Football",
];

const FAILURE_PREFIX: &str = "❌ Unable to connect to the sports knowledge base. ";
pub const STREAM_FAILURE: &str = "❌ Unable to connect to the sports knowledge base. The streaming response was interrupted. Please try again.";

/// Identifies one accepted send. Events stamped with any other ticket are
/// dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestTicket(u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub ticket: RequestTicket,
    pub query: String,
    pub mode: TransportMode,
}

#[derive(Debug)]
pub enum WorkerEvent {
    /// Cumulative streamed text received so far.
    Text(String),
    Answer(ChatAnswer),
    Done,
    Failed(TransportError),
}

#[derive(Debug)]
pub struct TicketedEvent {
    pub ticket: RequestTicket,
    pub event: WorkerEvent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Stale or unexpected event; nothing changed.
    Ignored,
    /// Streaming placeholder rewritten; request still in flight.
    Progress,
    /// Request settled. `success` is false when a diagnostic was shown.
    Settled { success: bool },
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    ticket: RequestTicket,
    mode: TransportMode,
}

/// Conversation plus the single-request send state machine
/// (`Idle -> Sending -> Success | Failure -> Idle`).
pub struct ChatSession {
    conversation: Conversation,
    pub input: String,
    status: ConnectionStatus,
    in_flight: Option<InFlight>,
    next_ticket: u64,
    host: String,
}

impl ChatSession {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            conversation: Conversation::new(timestamp_now()),
            input: String::new(),
            status: ConnectionStatus::Online,
            in_flight: None,
            next_ticket: 1,
            host: host.into(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn current_ticket(&self) -> Option<RequestTicket> {
        self.in_flight.map(|flight| flight.ticket)
    }

    /// Sends whatever is in the input field.
    pub fn submit_input(&mut self, mode: TransportMode) -> Option<PendingRequest> {
        let text = self.input.clone();
        self.submit(&text, mode)
    }

    /// Accepts `text` for sending unless it is blank or a request is already
    /// in flight.
    pub fn submit(&mut self, text: &str, mode: TransportMode) -> Option<PendingRequest> {
        if text.trim().is_empty() {
            return None;
        }
        if self.in_flight.is_some() {
            debug!("send ignored: a request is already in flight");
            return None;
        }

        let ticket = RequestTicket(self.next_ticket);
        self.next_ticket += 1;

        let stamp = timestamp_now();
        self.conversation.push(Message::user(text, stamp.clone()));
        if mode == TransportMode::Streaming {
            self.conversation.push(Message::bot(String::new(), stamp));
        }
        self.input.clear();
        self.status = ConnectionStatus::Connecting;
        self.in_flight = Some(InFlight { ticket, mode });

        info!(ticket = ticket.0, ?mode, "query dispatched");
        Some(PendingRequest {
            ticket,
            query: text.to_string(),
            mode,
        })
    }

    pub fn apply(&mut self, ticketed: TicketedEvent) -> Applied {
        let Some(flight) = self.in_flight else {
            return Applied::Ignored;
        };
        if flight.ticket != ticketed.ticket {
            debug!(ticket = ticketed.ticket.0, "dropping event for a stale request");
            return Applied::Ignored;
        }

        match (flight.mode, ticketed.event) {
            (TransportMode::Streaming, WorkerEvent::Text(cumulative)) => {
                self.conversation.replace_last_bot_content(cumulative);
                Applied::Progress
            }
            (TransportMode::Streaming, WorkerEvent::Done) => {
                self.settle(ConnectionStatus::Online);
                Applied::Settled { success: true }
            }
            (TransportMode::Streaming, WorkerEvent::Failed(err)) => {
                warn!(error = %err, "streamed query failed");
                self.conversation.replace_last_bot_content(STREAM_FAILURE);
                self.settle(ConnectionStatus::Offline);
                Applied::Settled { success: false }
            }
            (TransportMode::Whole, WorkerEvent::Answer(answer)) => {
                self.conversation
                    .push(Message::bot(answer.answer, timestamp_now()).with_sources(answer.sources));
                self.settle(ConnectionStatus::Online);
                Applied::Settled { success: true }
            }
            (TransportMode::Whole, WorkerEvent::Failed(err)) => {
                warn!(error = %err, "query failed");
                self.conversation
                    .push(Message::bot(describe_failure(&err, &self.host), timestamp_now()));
                self.settle(ConnectionStatus::Offline);
                Applied::Settled { success: false }
            }
            (mode, event) => {
                debug!(?mode, ?event, "event does not match transport mode");
                Applied::Ignored
            }
        }
    }

    /// Settles the current request as failed when its worker went away
    /// without reporting.
    pub fn abandon_in_flight(&mut self, reason: &str) -> Applied {
        match self.current_ticket() {
            Some(ticket) => self.apply(TicketedEvent {
                ticket,
                event: WorkerEvent::Failed(TransportError::Internal(reason.to_string())),
            }),
            None => Applied::Ignored,
        }
    }

    /// Resets the thread to one greeting and cancels any request in flight.
    /// Returns the ticket of the cancelled request.
    pub fn clear(&mut self) -> Option<RequestTicket> {
        let cancelled = self.in_flight.take().map(|flight| flight.ticket);
        if let Some(ticket) = cancelled {
            info!(ticket = ticket.0, "in-flight request cancelled by clear");
            self.status = ConnectionStatus::Online;
        }
        self.conversation.clear(timestamp_now());
        cancelled
    }

    pub fn message_text(&self, index: usize) -> Option<&str> {
        self.conversation.get(index).map(|message| message.content.as_str())
    }

    fn settle(&mut self, status: ConnectionStatus) {
        self.status = status;
        self.in_flight = None;
    }
}

pub fn describe_failure(err: &TransportError, host: &str) -> String {
    let detail = match err {
        TransportError::Timeout => "The request timed out. Please try again.".to_string(),
        TransportError::ServerError => {
            "Server error occurred. Please try again in a moment.".to_string()
        }
        TransportError::NotFound => format!(
            "Service endpoint not found. Please check if the backend server is running on {host}"
        ),
        TransportError::Unreachable(_) | TransportError::Stream(_) => format!(
            "Cannot reach the server. Please ensure:\n\n1. Backend server is running (uvicorn main:app --reload)\n2. Server is accessible at {host}\n3. CORS is properly configured"
        ),
        TransportError::Status(code) => format!("Server responded with error code: {code}"),
        TransportError::Malformed(_) => {
            "The server returned a response that could not be read. Please try again.".to_string()
        }
        TransportError::Internal(_) => {
            "An unexpected error occurred. Please try again.".to_string()
        }
    };

    format!("{FAILURE_PREFIX}{detail}")
}
