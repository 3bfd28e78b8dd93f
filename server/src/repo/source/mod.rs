//! Producers of per-frame packets.
//!
//! A source stands in for the vision pipeline: each call yields the packet
//! for one processed frame, or `None` when that frame had no usable result.

pub mod group;
pub mod replay;
pub mod synthetic;

pub use group::SourceGroup;
pub use replay::ReplaySource;
pub use synthetic::SyntheticSource;

use common_data::server::data::packet::Packet;

use async_trait::async_trait;

#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Option<Packet>;

    /// Called while nobody is listening; release whatever is expensive to hold.
    fn pause(&mut self) {}
}
