mod assembler;
mod mask;
mod message;
mod ping;

pub use assembler::{Action, Reassembler};
pub use mask::mask;
pub use message::Message;
pub(crate) use message::PartialMessage;
pub(crate) use ping::PingStats;
