use crate::repo::source::FrameSource;

use common_data::server::data::frames::{BlendShape, FaceData, Frame, Quaternion};
use common_data::server::data::packet::Packet;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BLEND_SHAPE_NAMES: [&str; 8] = [
    "eyeBlinkLeft",
    "eyeBlinkRight",
    "jawOpen",
    "mouthSmileLeft",
    "mouthSmileRight",
    "browInnerUp",
    "cheekPuff",
    "mouthPucker",
];

/// Every this many frames the synthetic face is "lost" for one frame.
const MISS_INTERVAL: u64 = 30;

/// Generates a slowly nodding face with jittered blend shapes, for checking a
/// client without a camera.
pub struct SyntheticSource {
    rng: StdRng,
    frame: u64,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        SyntheticSource { rng, frame: 0 }
    }

    fn face(&mut self) -> FaceData {
        let t = self.frame as f32 / 30.0;
        let half_angle = 0.15 * t.sin();

        let blend_shapes = BLEND_SHAPE_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let wave = 0.5 + 0.5 * (t * 0.7 + i as f32).sin();
                let jitter: f32 = self.rng.gen_range(-0.05..0.05);
                BlendShape {
                    name: name.to_string(),
                    value: ((wave + jitter).clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0,
                }
            })
            .collect();

        FaceData {
            head_rotation: Quaternion {
                x: half_angle.sin(),
                y: 0.0,
                z: 0.0,
                w: half_angle.cos(),
            },
            blend_shapes,
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Option<Packet> {
        self.frame += 1;

        if self.frame % MISS_INTERVAL == 0 {
            return Frame::Face(FaceData::default()).into_packet();
        }

        let face = self.face();
        Frame::Face(face).into_packet()
    }

    fn pause(&mut self) {
        self.frame = 0;
    }
}
