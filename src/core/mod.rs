pub mod chat_stream;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod history;
pub mod keys;
pub mod pacer;
pub mod retry;
pub mod session;
pub mod validation;
