use crate::repo::source::FrameSource;

use common_data::server::data::frames::Frame;
use common_data::server::data::packet::Packet;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, trace, warn};

/// Replays recorded frames from a JSON-lines file, looping at the end.
///
/// Each line is one tagged [`Frame`], e.g.
/// `{"type":"face","head_rotation":{..},"blend_shapes":[..]}`.
pub struct ReplaySource {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
}

impl ReplaySource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<ReplaySource> {
        let path = path.as_ref().to_path_buf();
        let lines = open_lines(&path).await?;
        Ok(ReplaySource {
            path,
            lines: Some(lines),
        })
    }

    async fn next_record(&mut self) -> Option<Frame> {
        let mut rewound = false;

        loop {
            if self.lines.is_none() {
                match open_lines(&self.path).await {
                    Ok(lines) => self.lines = Some(lines),
                    Err(e) => {
                        warn!(path = %self.path.display(), error = %e, "cannot reopen replay file");
                        return None;
                    }
                }
            }

            let lines = self.lines.as_mut()?;
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Frame>(&line) {
                        Ok(frame) => return Some(frame),
                        Err(e) => warn!(error = %e, "skipping malformed replay line"),
                    }
                }
                Ok(None) => {
                    // a file without a single usable record ends the replay
                    if rewound {
                        return None;
                    }
                    rewound = true;
                    self.lines = None;
                    trace!("replay rewound");
                }
                Err(e) => {
                    warn!(error = %e, "replay read failed");
                    self.lines = None;
                    return None;
                }
            }
        }
    }
}

async fn open_lines(path: &Path) -> io::Result<Lines<BufReader<File>>> {
    let file = File::open(path).await?;
    Ok(BufReader::new(file).lines())
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> Option<Packet> {
        let frame = self.next_record().await?;
        let code = frame.code();
        let packet = frame.into_packet();
        if packet.is_none() {
            trace!(%code, "frame has no valid result");
        }
        packet
    }

    fn pause(&mut self) {
        if self.lines.take().is_some() {
            debug!(path = %self.path.display(), "replay paused");
        }
    }
}
