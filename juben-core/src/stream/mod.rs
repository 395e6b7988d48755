//! From response bytes to typed events: [`FrameDecoder`] finds the
//! `data:` frames, [`parse_frame`] turns each one into a [`StreamEvent`].
//!
//! [`StreamEvent`]: crate::models::StreamEvent

mod decoder;
mod parser;

pub use decoder::{data_payload, FrameDecoder, LineBuffer, DONE_MARKER};
pub use parser::{parse_frame, parse_timestamp, MALFORMED_FRAME};
