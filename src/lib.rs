pub mod chat_api;
pub mod conversation;
pub mod export;
pub mod gui;
pub mod session;
pub mod settings;
pub mod worker;
