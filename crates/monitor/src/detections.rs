//! Fonte de detecções por frame.
//!
//! O reconhecedor em si é externo; aqui só consumimos o que ele produz.
//! [`ReplaySource`] lê um arquivo JSON-lines (um array por frame) e
//! [`NoDetections`] produz frames vazios indefinidamente.

use speedsign_core::protocol::decode_detection_frame;
use speedsign_core::types::RawDetection;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Produz as detecções de cada frame. `None` = fonte encerrada.
pub trait FrameSource {
    fn next_frame(&mut self, frame_index: u64) -> Option<Vec<RawDetection>>;
}

/// Nenhum reconhecedor conectado: todo frame é vazio.
#[derive(Debug, Default)]
pub struct NoDetections;

impl FrameSource for NoDetections {
    fn next_frame(&mut self, _frame_index: u64) -> Option<Vec<RawDetection>> {
        Some(Vec::new())
    }
}

/// Replay de detecções gravadas.
pub struct ReplaySource<R> {
    reader: R,
    line: Vec<u8>,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        info!("Replay de detecções: {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(256),
        }
    }
}

impl<R: BufRead> FrameSource for ReplaySource<R> {
    fn next_frame(&mut self, frame_index: u64) -> Option<Vec<RawDetection>> {
        self.line.clear();
        match self.reader.read_until(b'\n', &mut self.line) {
            Ok(0) => None,
            Ok(_) => match decode_detection_frame(&self.line, frame_index) {
                Ok(dets) => Some(dets),
                Err(e) => {
                    // Frame inválido conta como frame vazio
                    warn!("Frame {frame_index} de replay inválido: {e}");
                    Some(Vec::new())
                }
            },
            Err(e) => {
                warn!("Erro lendo replay: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speedsign_core::types::SpeedLimit;
    use std::io::Cursor;

    #[test]
    fn replays_frames_in_order() {
        let data = "[{\"label\": 30, \"confidence\": 0.9}]\n[]\n\nlixo\n[{\"label\": 50, \"confidence\": 0.8}]";
        let mut src = ReplaySource::new(Cursor::new(data));

        let mut labels = Vec::new();
        let mut index = 0;
        while let Some(frame) = src.next_frame(index) {
            labels.push(frame.first().map(|d| d.label));
            index += 1;
        }

        assert_eq!(
            labels,
            vec![Some(SpeedLimit(30)), None, None, None, Some(SpeedLimit(50))]
        );
    }

    #[test]
    fn no_detections_never_ends() {
        let mut src = NoDetections;
        for i in 0..100 {
            assert_eq!(src.next_frame(i), Some(Vec::new()));
        }
    }
}
