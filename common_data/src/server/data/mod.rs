pub mod frames;
pub mod packet;

pub use packet::{FrameError, Packet, PacketCode, PacketError};
