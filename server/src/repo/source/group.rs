use crate::repo::source::FrameSource;

use common_data::server::data::packet::Packet;

/// Several sources driven in lockstep, e.g. a face and a pose source fed by
/// the same camera frame.
#[derive(Default)]
pub struct SourceGroup {
    sources: Vec<Box<dyn FrameSource>>,
}

impl SourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Box<dyn FrameSource>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Asks every source for the current frame, in insertion order. Sources
    /// without a usable result contribute nothing.
    pub async fn next_frames(&mut self) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(self.sources.len());
        for source in &mut self.sources {
            if let Some(packet) = source.next_frame().await {
                packets.push(packet);
            }
        }
        packets
    }

    pub fn pause(&mut self) {
        for source in &mut self.sources {
            source.pause();
        }
    }
}

impl FromIterator<Box<dyn FrameSource>> for SourceGroup {
    fn from_iter<I: IntoIterator<Item = Box<dyn FrameSource>>>(iter: I) -> Self {
        SourceGroup {
            sources: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_data::server::data::packet::PacketCode;

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        code: Option<PacketCode>,
        pauses: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FrameSource for Fixed {
        async fn next_frame(&mut self) -> Option<Packet> {
            self.code.map(Packet::empty)
        }

        fn pause(&mut self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fixed(code: Option<PacketCode>, pauses: &Arc<AtomicUsize>) -> Box<dyn FrameSource> {
        Box::new(Fixed {
            code,
            pauses: Arc::clone(pauses),
        })
    }

    #[tokio::test]
    async fn collects_one_packet_per_source_with_a_result() {
        let pauses = Arc::new(AtomicUsize::new(0));
        let mut group: SourceGroup = [
            fixed(Some(PacketCode::FACE_DATA), &pauses),
            fixed(None, &pauses),
            fixed(Some(PacketCode::POSE_DATA), &pauses),
        ]
        .into_iter()
        .collect();

        let codes: Vec<PacketCode> = group.next_frames().await.iter().map(Packet::code).collect();
        assert_eq!(codes, vec![PacketCode::FACE_DATA, PacketCode::POSE_DATA]);
    }

    #[tokio::test]
    async fn pause_reaches_every_source() {
        let pauses = Arc::new(AtomicUsize::new(0));
        let mut group = SourceGroup::new();
        group.push(fixed(Some(PacketCode::FACE_DATA), &pauses));
        group.push(fixed(None, &pauses));

        group.pause();
        assert_eq!(pauses.load(Ordering::SeqCst), 2);
        assert_eq!(group.len(), 2);
    }

    #[tokio::test]
    async fn empty_group_yields_nothing() {
        let mut group = SourceGroup::new();
        assert!(group.is_empty());
        assert!(group.next_frames().await.is_empty());
    }
}
