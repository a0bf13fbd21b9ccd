//! Protocol-level client logic shared by the customer widget and the admin
//! dashboard. Rendering lives elsewhere; this module only turns wire events
//! into one ordered transcript.

pub mod session;

pub use session::{Action, ChatSession, EntryStatus, TranscriptEntry};
