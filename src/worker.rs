use crate::chat_api::{ChatClient, ChatConfig, TransportError};
use crate::session::{PendingRequest, TicketedEvent, WorkerEvent};
use crate::settings::TransportMode;
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs one request to completion, reporting through `emit`.
///
/// `emit` returning `ControlFlow::Break` means nobody is listening any more;
/// a streamed body stops being read at that point.
pub async fn drive_request<F>(client: &ChatClient, request: &PendingRequest, mut emit: F)
where
    F: FnMut(WorkerEvent) -> ControlFlow<()> + Send,
{
    match request.mode {
        TransportMode::Whole => {
            let event = match client.ask(&request.query).await {
                Ok(answer) => WorkerEvent::Answer(answer),
                Err(err) => WorkerEvent::Failed(err),
            };
            let _ = emit(event);
        }
        TransportMode::Streaming => {
            let mut cumulative = String::new();
            let result = client
                .stream(&request.query, |delta| {
                    cumulative.push_str(delta);
                    emit(WorkerEvent::Text(cumulative.clone()))
                })
                .await;

            let _ = match result {
                Ok(()) => emit(WorkerEvent::Done),
                Err(err) => emit(WorkerEvent::Failed(err)),
            };
        }
    }
}

/// Owner side of a spawned request: its event channel and its cancel signal.
///
/// Dropping the handle cancels the request.
pub struct RequestHandle {
    events: Receiver<TicketedEvent>,
    cancel: CancellationToken,
}

impl RequestHandle {
    pub fn new(events: Receiver<TicketedEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    pub fn events(&self) -> &Receiver<TicketedEvent> {
        &self.events
    }

    /// Aborts the HTTP call in flight and closes its connection.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Runs `request` on its own thread with a single-threaded runtime.
pub fn spawn_request(config: ChatConfig, request: PendingRequest) -> RequestHandle {
    let (tx, rx) = mpsc::channel::<TicketedEvent>();
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();

    thread::spawn(move || {
        let ticket = request.ticket;
        let send = move |event: WorkerEvent| match tx.send(TicketedEvent { ticket, event }) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => {
                debug!("receiver dropped, stopping worker");
                ControlFlow::Break(())
            }
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        let runtime = match runtime {
            Ok(rt) => rt,
            Err(err) => {
                let _ = send(WorkerEvent::Failed(TransportError::Internal(format!(
                    "Unable to start the async runtime: {err}"
                ))));
                return;
            }
        };

        let client = match ChatClient::new(config) {
            Ok(client) => client,
            Err(err) => {
                let _ = send(WorkerEvent::Failed(TransportError::Internal(format!(
                    "{err:#}"
                ))));
                return;
            }
        };

        runtime.block_on(async {
            tokio::select! {
                () = worker_cancel.cancelled() => {
                    debug!(ticket = ?ticket, "request cancelled, connection dropped");
                }
                () = drive_request(&client, &request, send) => {}
            }
        });
    });

    RequestHandle::new(rx, cancel)
}
