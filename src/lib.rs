//! Book-review feedback coach.
//!
//! A reader pastes a review, picks the kind of feedback they want, and the
//! reply of a hosted chat model is streamed back into the conversation. The
//! web form (`web_server`) and the terminal prompt (`chat`) both drive a
//! [`session::ReviewSession`].

pub mod chat;
pub mod constants;
pub mod openai;
pub mod prompt;
pub mod session;
pub mod sse;
pub mod transcript;
pub mod web_server;
