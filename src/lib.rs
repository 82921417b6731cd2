pub mod chat;
pub mod cli;
pub mod completion;
pub mod core;
pub mod settings;
