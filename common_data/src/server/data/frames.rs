use crate::server::data::packet::{Packet, PacketCode};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlendShape {
    pub name: String,
    pub value: f32,
}

/// Head rotation plus blend shape weights for one detected face.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FaceData {
    pub head_rotation: Quaternion,
    pub blend_shapes: Vec<BlendShape>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PoseData {
    pub landmarks: Vec<Landmark>,
}

impl FaceData {
    pub fn is_valid(&self) -> bool {
        !self.blend_shapes.is_empty()
    }
}

impl PoseData {
    pub fn is_valid(&self) -> bool {
        !self.landmarks.is_empty()
    }
}

/// One per-frame result of the vision pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Face(FaceData),
    Pose(PoseData),
}

impl Frame {
    pub fn code(&self) -> PacketCode {
        match self {
            Frame::Face(_) => PacketCode::FACE_DATA,
            Frame::Pose(_) => PacketCode::POSE_DATA,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Frame::Face(face) => face.is_valid(),
            Frame::Pose(pose) => pose.is_valid(),
        }
    }

    /// Serializes the frame body into a packet.
    ///
    /// Returns `None` for frames that fail the validity check or whose body
    /// would not fit a single packet.
    pub fn into_packet(self) -> Option<Packet> {
        if !self.is_valid() {
            return None;
        }

        let code = self.code();
        let body = match &self {
            Frame::Face(face) => serde_json::to_vec(face),
            Frame::Pose(pose) => serde_json::to_vec(pose),
        };

        Packet::new(code, body.ok()?).ok()
    }
}
