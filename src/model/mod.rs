pub mod contexts;
pub mod event;

pub use event::{EventPayload, InterchangeEvent};
