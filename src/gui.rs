use crate::chat_api::ChatConfig;
use crate::conversation::{Message, Role};
use crate::export::write_transcript;
use crate::session::{Applied, ChatSession, PROMPT_SHORTCUTS};
use crate::settings::{ConnectionStatus, FontSize, Settings, TransportMode};
use crate::worker::{spawn_request, RequestHandle};
use anyhow::{anyhow, Result};
use chrono::Utc;
use eframe::egui::{self, Align, Button, Color32, Frame, Layout, RichText, ScrollArea, Stroke};
use std::path::PathBuf;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;
use tracing::{info, warn};

const APP_TITLE: &str = "Sports Assistant";
const BUBBLE_MARGIN: i8 = 10;
const BUBBLE_STROKE: f32 = 1.0;

#[derive(Debug, PartialEq, Eq)]
enum BubbleText<'a> {
    Content(&'a str),
    Typing,
    Empty,
}

fn bubble_text(message: &Message, typing: bool) -> BubbleText<'_> {
    if !message.content.is_empty() {
        BubbleText::Content(message.content.as_str())
    } else if typing {
        BubbleText::Typing
    } else {
        BubbleText::Empty
    }
}

#[derive(Clone, Copy)]
struct Palette {
    panel: Color32,
    user_bubble: Color32,
    bot_bubble: Color32,
    user_title: Color32,
    bot_title: Color32,
    border: Color32,
    muted: Color32,
}

impl Palette {
    fn for_settings(settings: &Settings) -> Self {
        if settings.dark_mode {
            Self {
                panel: Color32::from_rgb(17, 24, 39),
                user_bubble: Color32::from_rgb(30, 58, 138),
                bot_bubble: Color32::from_rgb(31, 41, 55),
                user_title: Color32::from_rgb(147, 197, 253),
                bot_title: Color32::from_rgb(94, 234, 212),
                border: Color32::from_rgb(55, 65, 81),
                muted: Color32::from_rgb(156, 163, 175),
            }
        } else {
            Self {
                panel: Color32::from_rgb(239, 246, 255),
                user_bubble: Color32::from_rgb(219, 234, 254),
                bot_bubble: Color32::from_rgb(255, 255, 255),
                user_title: Color32::from_rgb(29, 78, 216),
                bot_title: Color32::from_rgb(15, 118, 110),
                border: Color32::from_rgb(191, 219, 254),
                muted: Color32::from_rgb(107, 114, 128),
            }
        }
    }
}

fn status_color(status: ConnectionStatus) -> Color32 {
    match status {
        ConnectionStatus::Online => Color32::from_rgb(34, 197, 94),
        ConnectionStatus::Connecting => Color32::from_rgb(234, 179, 8),
        ConnectionStatus::Offline => Color32::from_rgb(239, 68, 68),
    }
}

pub fn run_gui(config: ChatConfig, settings: Settings, export_dir: PathBuf) -> Result<()> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 700.0])
            .with_min_inner_size([420.0, 460.0])
            .with_title(APP_TITLE),
        ..Default::default()
    };

    eframe::run_native(
        APP_TITLE,
        native_options,
        Box::new(move |_cc| {
            Ok(Box::new(SportsChatApp::new(
                config.clone(),
                settings,
                export_dir.clone(),
            )))
        }),
    )
    .map_err(|err| anyhow!("Unable to start the chat window: {err}"))
}

fn configure_theme(ctx: &egui::Context, dark_mode: bool, font_size: FontSize) {
    ctx.set_theme(if dark_mode {
        egui::Theme::Dark
    } else {
        egui::Theme::Light
    });

    let mut style = (*ctx.style()).clone();
    style.visuals = if dark_mode {
        egui::Visuals::dark()
    } else {
        egui::Visuals::light()
    };

    let body = font_size.body_points();
    style.spacing.item_spacing = egui::vec2(8.0, 8.0);
    style.spacing.button_padding = egui::vec2(10.0, 6.0);
    style
        .text_styles
        .insert(egui::TextStyle::Heading, egui::FontId::proportional(body + 6.0));
    style
        .text_styles
        .insert(egui::TextStyle::Body, egui::FontId::proportional(body));
    style
        .text_styles
        .insert(egui::TextStyle::Button, egui::FontId::proportional(body));
    style
        .text_styles
        .insert(egui::TextStyle::Small, egui::FontId::proportional(body - 2.0));
    ctx.set_style(style);
}

pub struct SportsChatApp {
    config: ChatConfig,
    settings: Settings,
    session: ChatSession,
    worker: Option<RequestHandle>,
    export_dir: PathBuf,
    notice: Option<String>,
    applied_theme: Option<(bool, FontSize)>,
}

impl SportsChatApp {
    fn new(config: ChatConfig, settings: Settings, export_dir: PathBuf) -> Self {
        let session = ChatSession::new(config.host.clone());
        Self {
            config,
            settings,
            session,
            worker: None,
            export_dir,
            notice: None,
            applied_theme: None,
        }
    }

    /// Sends `shortcut` when given, otherwise the typed input.
    fn send(&mut self, shortcut: Option<&str>) {
        let mode = self.settings.transport;
        let request = match shortcut {
            Some(text) => self.session.submit(text, mode),
            None => self.session.submit_input(mode),
        };

        if let Some(request) = request {
            self.notice = None;
            self.worker = Some(spawn_request(self.config.clone(), request));
        }
    }

    /// Applies every event the worker has reported so far. Returns true when a
    /// request finished successfully during this call.
    fn drain_worker_events(&mut self) -> bool {
        let mut succeeded = false;
        let mut disconnected = false;

        loop {
            let event = match self.worker.as_ref() {
                Some(worker) => worker.events().try_recv(),
                None => break,
            };

            match event {
                Ok(event) => match self.session.apply(event) {
                    Applied::Settled { success } => {
                        succeeded |= success;
                        self.worker = None;
                        break;
                    }
                    Applied::Progress | Applied::Ignored => {}
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if disconnected {
            self.worker = None;
            self.session
                .abandon_in_flight("The request worker stopped without an answer");
        }

        succeeded
    }

    fn clear_chat(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel();
        }
        self.session.clear();
        self.notice = None;
    }

    fn export_chat(&mut self) {
        let today = Utc::now().date_naive();
        match write_transcript(&self.export_dir, self.session.conversation(), today) {
            Ok(path) => {
                info!(path = %path.display(), "chat exported");
                self.notice = Some(format!("Chat exported to {}", path.display()));
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "chat export failed");
                self.notice = Some(format!("Export failed: {err:#}"));
            }
        }
    }

    fn notify(&self, ctx: &egui::Context) {
        if self.settings.sound_enabled {
            ctx.send_viewport_cmd(egui::ViewportCommand::RequestUserAttention(
                egui::UserAttentionType::Informational,
            ));
        }
    }

    fn sync_theme(&mut self, ctx: &egui::Context) {
        let wanted = (self.settings.dark_mode, self.settings.font_size);
        if self.applied_theme != Some(wanted) {
            configure_theme(ctx, wanted.0, wanted.1);
            self.applied_theme = Some(wanted);
        }
    }

    /// Draws one bubble. Returns its rect and whether "Copy" was clicked.
    ///
    /// `typing` marks the streaming placeholder of the request in flight.
    fn render_message(
        ui: &mut egui::Ui,
        message: &Message,
        typing: bool,
        palette: Palette,
    ) -> (egui::Rect, bool) {
        let (fill, title_color, is_user) = match message.role {
            Role::User => (palette.user_bubble, palette.user_title, true),
            Role::Bot => (palette.bot_bubble, palette.bot_title, false),
        };
        let max_bubble_width = (ui.available_width() * 0.82).clamp(220.0, 760.0);
        let content_width = max_bubble_width - 2.0 * (BUBBLE_MARGIN as f32 + BUBBLE_STROKE);
        let row_layout = if is_user {
            Layout::right_to_left(Align::TOP)
        } else {
            Layout::left_to_right(Align::TOP)
        };

        let mut bubble_rect = egui::Rect::NOTHING;
        let mut copy_clicked = false;
        ui.horizontal(|ui| {
            ui.set_width(ui.available_width());
            ui.with_layout(row_layout, |ui| {
                bubble_rect = ui
                    .scope(|ui| {
                        ui.set_max_width(max_bubble_width);
                        Frame::default()
                            .fill(fill)
                            .stroke(Stroke::new(BUBBLE_STROKE, palette.border))
                            .inner_margin(egui::Margin::same(BUBBLE_MARGIN))
                            .show(ui, |ui| {
                                ui.vertical(|ui| {
                                    ui.set_max_width(content_width);
                                    ui.horizontal(|ui| {
                                        ui.label(
                                            RichText::new(message.role.label())
                                                .strong()
                                                .color(title_color),
                                        );
                                        ui.label(
                                            RichText::new(message.timestamp.as_str())
                                                .small()
                                                .color(palette.muted),
                                        );
                                        if !message.content.is_empty() {
                                            copy_clicked = ui.small_button("Copy").clicked();
                                        }
                                    });

                                    match bubble_text(message, typing) {
                                        BubbleText::Content(text) => {
                                            ui.add(egui::Label::new(text).wrap());
                                        }
                                        BubbleText::Typing => {
                                            ui.label(RichText::new("...").italics());
                                        }
                                        BubbleText::Empty => {}
                                    }

                                    if !message.sources.is_empty() {
                                        ui.separator();
                                        ui.label(RichText::new("Sources:").small().strong());
                                        for source in &message.sources {
                                            ui.add(
                                                egui::Label::new(
                                                    RichText::new(format!("• {source}"))
                                                        .small()
                                                        .color(palette.muted),
                                                )
                                                .wrap(),
                                            );
                                        }
                                    }
                                });
                            })
                            .response
                            .rect
                    })
                    .inner;
            });
        });

        (bubble_rect, copy_clicked)
    }

    fn sidebar(&mut self, ui: &mut egui::Ui) -> SidebarAction {
        let mut action = SidebarAction::None;
        let pending = self.session.is_pending();

        ui.heading("Quick questions");
        for prompt in PROMPT_SHORTCUTS {
            if ui
                .add_enabled(!pending, Button::new(prompt).wrap())
                .clicked()
            {
                action = SidebarAction::Prompt(prompt);
            }
        }

        ui.separator();
        ui.heading("Conversation");
        ui.horizontal(|ui| {
            if ui.button("Clear chat").clicked() {
                action = SidebarAction::Clear;
            }
            if ui.button("Export").clicked() {
                action = SidebarAction::Export;
            }
        });

        ui.separator();
        ui.heading("Settings");
        ui.checkbox(&mut self.settings.dark_mode, "Dark mode");
        ui.checkbox(&mut self.settings.sound_enabled, "Notifications");
        ui.horizontal(|ui| {
            ui.label("Font size:");
            for size in FontSize::ALL {
                ui.selectable_value(&mut self.settings.font_size, size, size.label());
            }
        });
        ui.add_enabled_ui(!pending, |ui| {
            ui.horizontal(|ui| {
                ui.label("Answers:");
                ui.selectable_value(&mut self.settings.transport, TransportMode::Whole, "Whole");
                ui.selectable_value(
                    &mut self.settings.transport,
                    TransportMode::Streaming,
                    "Streaming",
                );
            });
        });

        action
    }
}

enum SidebarAction {
    None,
    Prompt(&'static str),
    Clear,
    Export,
}

impl eframe::App for SportsChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.drain_worker_events() {
            self.notify(ctx);
        }
        self.sync_theme(ctx);
        let palette = Palette::for_settings(&self.settings);

        egui::TopBottomPanel::top("title_bar")
            .frame(Frame::default().fill(palette.panel).inner_margin(egui::Margin::same(8)))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.toggle_value(&mut self.settings.sidebar_open, "Menu");
                    ui.label(RichText::new(APP_TITLE).heading().strong());
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        let status = self.session.status();
                        ui.label(RichText::new(status.label()).color(status_color(status)));
                    });
                });
            });

        let mut action = SidebarAction::None;
        if self.settings.sidebar_open {
            egui::SidePanel::left("sidebar")
                .resizable(false)
                .default_width(240.0)
                .frame(Frame::default().fill(palette.panel).inner_margin(egui::Margin::same(10)))
                .show(ctx, |ui| {
                    action = self.sidebar(ui);
                });
        }

        match action {
            SidebarAction::None => {}
            SidebarAction::Prompt(prompt) => self.send(Some(prompt)),
            SidebarAction::Clear => {
                self.clear_chat();
                self.notify(ctx);
            }
            SidebarAction::Export => self.export_chat(),
        }

        egui::TopBottomPanel::bottom("input_bar")
            .resizable(false)
            .frame(Frame::default().fill(palette.panel).inner_margin(egui::Margin::same(8)))
            .show(ctx, |ui| {
                let pending = self.session.is_pending();
                ui.horizontal(|ui| {
                    let send_width = 90.0;
                    let input_width = (ui.available_width() - send_width - 16.0).max(120.0);
                    let response = ui.add_enabled(
                        !pending,
                        egui::TextEdit::singleline(&mut self.session.input)
                            .hint_text("Ask me anything about sports...")
                            .desired_width(input_width),
                    );
                    let enter_pressed =
                        response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                    if ui
                        .add_enabled(
                            !pending,
                            Button::new("Send").min_size(egui::vec2(send_width, 24.0)),
                        )
                        .clicked()
                        || enter_pressed
                    {
                        self.send(None);
                        response.request_focus();
                    }
                });

                ui.horizontal(|ui| {
                    if pending {
                        ui.spinner();
                        ui.label(RichText::new("Thinking...").small());
                    }
                    if let Some(notice) = &self.notice {
                        ui.label(RichText::new(notice.as_str()).small().color(palette.muted));
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(
                            RichText::new(format!(
                                "{} message(s)",
                                self.session.conversation().len()
                            ))
                            .small()
                            .color(palette.muted),
                        );
                    });
                });
            });

        let mut copy_request = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical()
                .id_salt("conversation_scroll")
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    let messages = self.session.conversation().messages();
                    let pending = self.session.is_pending();
                    for (index, message) in messages.iter().enumerate() {
                        let typing = pending && index + 1 == messages.len();
                        let (_, copy_clicked) =
                            Self::render_message(ui, message, typing, palette);
                        if copy_clicked {
                            copy_request = Some(index);
                        }
                        ui.add_space(6.0);
                    }
                });
        });

        if let Some(text) = copy_request.and_then(|index| self.session.message_text(index)) {
            ctx.copy_text(text.to_string());
            self.notice = Some("Message copied to clipboard".to_string());
        }

        if self.session.is_pending() {
            ctx.request_repaint_after(Duration::from_millis(16));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_api::{ChatAnswer, TransportError};
    use crate::conversation::CLEARED_GREETING;
    use crate::session::{TicketedEvent, WorkerEvent};
    use std::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn test_app() -> SportsChatApp {
        SportsChatApp::new(
            ChatConfig {
                host: "http://127.0.0.1:9".to_string(),
                ..ChatConfig::default()
            },
            Settings::default(),
            std::env::temp_dir(),
        )
    }

    /// Submits through the session and wires a hand-fed channel in place of a
    /// real worker.
    fn app_with_fake_worker(
        mode: TransportMode,
    ) -> (SportsChatApp, mpsc::Sender<TicketedEvent>, TicketStamp) {
        let mut app = test_app();
        app.settings.transport = mode;
        let request = app.session.submit("History of Cricket", mode).unwrap();
        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        app.worker = Some(RequestHandle::new(rx, cancel.clone()));
        (app, tx, TicketStamp(request.ticket, cancel))
    }

    struct TicketStamp(crate::session::RequestTicket, CancellationToken);

    impl TicketStamp {
        fn make(&self, event: WorkerEvent) -> TicketedEvent {
            TicketedEvent {
                ticket: self.0,
                event,
            }
        }
    }

    fn render_rect_for_message(message: Message, available_width: f32) -> egui::Rect {
        let ctx = egui::Context::default();
        let mut rendered_rect = None;
        let palette = Palette::for_settings(&Settings::default());

        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.allocate_ui_with_layout(
                    egui::vec2(available_width, 400.0),
                    Layout::top_down(Align::LEFT),
                    |ui| {
                        rendered_rect =
                            Some(SportsChatApp::render_message(ui, &message, false, palette).0);
                    },
                );
            });
        });

        rendered_rect.expect("message should be rendered")
    }

    #[test]
    fn drain_applies_whole_answer_and_releases_worker() {
        let (mut app, tx, factory) = app_with_fake_worker(TransportMode::Whole);
        tx.send(factory.make(WorkerEvent::Answer(ChatAnswer {
            answer: "Cricket originated in England.".to_string(),
            sources: vec!["Wikipedia".to_string()],
        })))
        .unwrap();

        assert!(app.drain_worker_events());

        assert!(app.worker.is_none());
        assert!(!app.session.is_pending());
        assert_eq!(app.session.status(), ConnectionStatus::Online);
        assert_eq!(
            app.session.conversation().last().unwrap().content,
            "Cricket originated in England."
        );
    }

    #[test]
    fn drain_applies_streamed_chunks_in_order() {
        let (mut app, tx, factory) = app_with_fake_worker(TransportMode::Streaming);
        tx.send(factory.make(WorkerEvent::Text("Cricket ".to_string())))
            .unwrap();

        assert!(!app.drain_worker_events());
        assert_eq!(app.session.conversation().last().unwrap().content, "Cricket ");
        assert!(app.worker.is_some());

        tx.send(factory.make(WorkerEvent::Text("Cricket rules".to_string())))
            .unwrap();
        tx.send(factory.make(WorkerEvent::Done)).unwrap();

        assert!(app.drain_worker_events());
        assert_eq!(app.session.conversation().last().unwrap().content, "Cricket rules");
        assert_eq!(app.session.conversation().len(), 3);
    }

    #[test]
    fn drain_reports_failure_without_success_flag() {
        let (mut app, tx, factory) = app_with_fake_worker(TransportMode::Whole);
        tx.send(factory.make(WorkerEvent::Failed(TransportError::Timeout)))
            .unwrap();

        assert!(!app.drain_worker_events());
        assert_eq!(app.session.status(), ConnectionStatus::Offline);
        assert!(app
            .session
            .conversation()
            .last()
            .unwrap()
            .content
            .contains("timed out"));
    }

    #[test]
    fn vanished_worker_settles_request() {
        let (mut app, tx, _factory) = app_with_fake_worker(TransportMode::Whole);
        drop(tx);

        assert!(!app.drain_worker_events());

        assert!(!app.session.is_pending());
        assert!(app.worker.is_none());
        assert_eq!(app.session.conversation().len(), 3);
    }

    #[test]
    fn clear_chat_cancels_worker_and_resets_thread() {
        let (mut app, tx, factory) = app_with_fake_worker(TransportMode::Streaming);
        assert!(!factory.1.is_cancelled());

        app.clear_chat();

        assert!(factory.1.is_cancelled());
        assert!(app.worker.is_none());
        assert!(tx.send(factory.make(WorkerEvent::Done)).is_err());
        assert_eq!(app.session.conversation().len(), 1);
        assert_eq!(
            app.session.conversation().last().unwrap().content,
            CLEARED_GREETING
        );
    }

    #[test]
    fn export_chat_reports_written_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app();
        app.export_dir = dir.path().to_path_buf();

        app.export_chat();

        let notice = app.notice.clone().unwrap();
        assert!(notice.starts_with("Chat exported to"), "{notice}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn render_message_long_text_stays_within_expected_width() {
        let message = Message::bot("a very long sports answer ".repeat(120), "1:00:00 PM")
            .with_sources(vec!["https://en.wikipedia.org/wiki/History_of_cricket".to_string()]);
        let available_width = 420.0;
        let expected_max_width = (available_width * 0.82f32).clamp(220.0, 760.0);

        let rect = render_rect_for_message(message, available_width);

        assert!(
            rect.width() <= expected_max_width + 1.0,
            "bubble width {} exceeded max {}",
            rect.width(),
            expected_max_width
        );
    }

    #[test]
    fn render_message_user_bubble_stays_within_expected_width() {
        let message = Message::user("who won the most cricket world cups ".repeat(60), "1:00:00 PM");
        let available_width = 500.0;
        let expected_max_width = (available_width * 0.82f32).clamp(220.0, 760.0);

        let rect = render_rect_for_message(message, available_width);

        assert!(
            rect.width() <= expected_max_width + 1.0,
            "bubble width {} exceeded max {}",
            rect.width(),
            expected_max_width
        );
    }

    #[test]
    fn typing_dots_only_for_pending_placeholder() {
        let placeholder = Message::bot("", "1:00:00 PM");
        let answered = Message::bot("Cricket originated in England.", "1:00:01 PM");

        assert_eq!(bubble_text(&placeholder, true), BubbleText::Typing);
        assert_eq!(bubble_text(&placeholder, false), BubbleText::Empty);
        assert_eq!(
            bubble_text(&answered, true),
            BubbleText::Content("Cricket originated in England.")
        );
    }

    #[test]
    fn settled_empty_stream_is_not_marked_typing() {
        let (mut app, tx, factory) = app_with_fake_worker(TransportMode::Streaming);
        tx.send(factory.make(WorkerEvent::Done)).unwrap();

        app.drain_worker_events();

        let last = app.session.conversation().last().unwrap();
        assert!(!app.session.is_pending());
        assert_eq!(bubble_text(last, app.session.is_pending()), BubbleText::Empty);
    }

    #[test]
    fn dark_palette_differs_from_light() {
        let light = Palette::for_settings(&Settings::default());
        let dark = Palette::for_settings(&Settings {
            dark_mode: true,
            ..Settings::default()
        });

        assert_ne!(light.panel, dark.panel);
        assert_ne!(light.bot_bubble, dark.bot_bubble);
    }
}
