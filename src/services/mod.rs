pub mod api_key;
pub mod chat;
pub mod dispatcher;
pub mod inference;
pub mod reaper;
pub mod session;
