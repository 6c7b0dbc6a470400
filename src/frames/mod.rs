mod control;
mod data;
mod decode;
mod encode;
mod frame;
mod opcode;

pub use control::CloseFrame;
pub(crate) use data::DataFrame;
pub use decode::{FrameDecoder, FrameReader};
pub use encode::{encode_frame, write_frame};
pub use frame::Frame;
pub use opcode::Opcode;
