//! Chat/completion API types shared by the proxy

mod chat;

pub use chat::*;
