//! Debounce temporal das detecções por frame.
//!
//! Uma placa só é confirmada depois de aparecer como melhor detecção em
//! N frames consecutivos. A confirmação é emitida uma única vez por
//! sequência; o valor continua legível em [`DetectionDebouncer::current`]
//! enquanto a sequência se mantém.
//!
//! Frames vazios: até K frames vazios consecutivos são tolerados sem quebrar
//! a sequência (e sem estendê-la). O frame vazio K+1 zera tudo.

use crate::config::DetectionConfig;
use crate::types::{ConfirmedSign, RawDetection, SpeedLimit};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DetectionDebouncer {
    confirm_frames: u32,
    max_dropout_frames: u32,
    min_confidence: f32,
    min_box_area: f32,

    candidate: Option<SpeedLimit>,
    run_length: u32,
    empty_streak: u32,
    confirmed: Option<ConfirmedSign>,
}

impl DetectionDebouncer {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            confirm_frames: config.confirm_frames.max(1),
            max_dropout_frames: config.max_dropout_frames,
            min_confidence: config.min_confidence,
            min_box_area: config.min_box_area,
            candidate: None,
            run_length: 0,
            empty_streak: 0,
            confirmed: None,
        }
    }

    /// Consome as detecções de um frame. Retorna `Some` apenas no frame em
    /// que a sequência atinge N.
    pub fn observe(&mut self, detections: &[RawDetection]) -> Option<ConfirmedSign> {
        let Some(top) = self.top_detection(detections) else {
            self.empty_streak += 1;
            if self.empty_streak > self.max_dropout_frames && self.candidate.is_some() {
                debug!(
                    "Sequência de {:?} quebrada após {} frames vazios",
                    self.candidate, self.empty_streak
                );
                self.reset();
            }
            return None;
        };

        self.empty_streak = 0;

        if self.candidate == Some(top.label) {
            self.run_length = self.run_length.saturating_add(1);
        } else {
            self.candidate = Some(top.label);
            self.run_length = 1;
            if self.confirmed.is_some_and(|c| c.label != top.label) {
                self.confirmed = None;
            }
        }

        if self.run_length == self.confirm_frames {
            let sign = ConfirmedSign {
                label: top.label,
                confirmed_at_frame: top.frame_index,
            };
            debug!("Placa confirmada: {} no frame {}", sign.label, sign.confirmed_at_frame);
            self.confirmed = Some(sign);
            return Some(sign);
        }

        None
    }

    /// Placa confirmada vigente (mantida enquanto a sequência não quebra).
    pub fn current(&self) -> Option<ConfirmedSign> {
        self.confirmed
    }

    /// Candidato atual e tamanho da sequência.
    pub fn candidate(&self) -> Option<(SpeedLimit, u32)> {
        self.candidate.map(|label| (label, self.run_length))
    }

    pub fn reset(&mut self) {
        self.candidate = None;
        self.run_length = 0;
        self.empty_streak = 0;
        self.confirmed = None;
    }

    /// Melhor detecção do frame, descartando confiança ou caixa pequenas.
    fn top_detection<'a>(&self, detections: &'a [RawDetection]) -> Option<&'a RawDetection> {
        detections
            .iter()
            .filter(|d| d.confidence >= self.min_confidence)
            .filter(|d| d.bbox.area() >= self.min_box_area)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn config(confirm_frames: u32, max_dropout_frames: u32) -> DetectionConfig {
        DetectionConfig {
            confirm_frames,
            max_dropout_frames,
            ..Default::default()
        }
    }

    fn det(label: u32, confidence: f32, frame_index: u64) -> RawDetection {
        RawDetection {
            label: SpeedLimit(label),
            confidence,
            frame_index,
            bbox: BoundingBox::from([0.0, 0.0, 50.0, 50.0]),
        }
    }

    /// Alimenta uma sequência de labels (`None` = frame vazio) e devolve
    /// as confirmações emitidas.
    fn feed(deb: &mut DetectionDebouncer, labels: &[Option<u32>]) -> Vec<ConfirmedSign> {
        labels
            .iter()
            .enumerate()
            .filter_map(|(i, label)| {
                let frame: Vec<RawDetection> =
                    label.map(|l| det(l, 0.9, i as u64)).into_iter().collect();
                deb.observe(&frame)
            })
            .collect()
    }

    #[test]
    fn confirms_once_at_nth_frame() {
        let mut deb = DetectionDebouncer::new(&config(3, 1));
        let confirmed = feed(&mut deb, &[Some(30); 10]);
        assert_eq!(
            confirmed,
            vec![ConfirmedSign {
                label: SpeedLimit(30),
                confirmed_at_frame: 2,
            }]
        );
        assert_eq!(deb.current().map(|c| c.label), Some(SpeedLimit(30)));
    }

    #[test]
    fn n_minus_one_then_different_label_never_confirms() {
        let mut deb = DetectionDebouncer::new(&config(3, 1));
        let confirmed = feed(&mut deb, &[Some(30), Some(30), Some(50), Some(30), Some(30)]);
        assert!(confirmed.is_empty());
        assert!(deb.current().is_none());
        assert_eq!(deb.candidate(), Some((SpeedLimit(30), 2)));
    }

    #[test]
    fn single_empty_frame_is_tolerated() {
        let mut deb = DetectionDebouncer::new(&config(3, 1));
        let confirmed = feed(&mut deb, &[Some(30), None, Some(30), Some(30)]);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].confirmed_at_frame, 3);
    }

    #[test]
    fn too_many_empty_frames_reset_the_run() {
        let mut deb = DetectionDebouncer::new(&config(3, 1));
        let confirmed = feed(&mut deb, &[Some(30), Some(30), None, None, Some(30)]);
        assert!(confirmed.is_empty());
        assert_eq!(deb.candidate(), Some((SpeedLimit(30), 1)));
    }

    #[test]
    fn strict_mode_resets_on_first_empty_frame() {
        let mut deb = DetectionDebouncer::new(&config(3, 0));
        let confirmed = feed(&mut deb, &[Some(30), Some(30), None, Some(30), Some(30)]);
        assert!(confirmed.is_empty());
    }

    #[test]
    fn confirmed_sign_cleared_when_run_breaks() {
        let mut deb = DetectionDebouncer::new(&config(2, 1));
        feed(&mut deb, &[Some(40), Some(40)]);
        assert!(deb.current().is_some());

        deb.observe(&[]);
        assert!(deb.current().is_some(), "um frame vazio é tolerado");
        deb.observe(&[]);
        assert!(deb.current().is_none());
    }

    #[test]
    fn new_label_replaces_confirmation() {
        let mut deb = DetectionDebouncer::new(&config(2, 1));
        let confirmed = feed(&mut deb, &[Some(40), Some(40), Some(20), Some(20)]);
        let labels: Vec<_> = confirmed.iter().map(|c| c.label.0).collect();
        assert_eq!(labels, vec![40, 20]);
        assert_eq!(deb.current().map(|c| c.label), Some(SpeedLimit(20)));
    }

    #[test]
    fn reconfirms_after_run_restarts() {
        let mut deb = DetectionDebouncer::new(&config(3, 0));
        let confirmed = feed(
            &mut deb,
            &[Some(30), Some(30), Some(30), None, Some(30), Some(30), Some(30)],
        );
        assert_eq!(confirmed.len(), 2);
    }

    #[test]
    fn highest_confidence_wins_within_a_frame() {
        let mut deb = DetectionDebouncer::new(&config(1, 0));
        let sign = deb.observe(&[det(30, 0.7, 0), det(50, 0.95, 0), det(20, 0.8, 0)]);
        assert_eq!(sign.map(|s| s.label), Some(SpeedLimit(50)));
    }

    #[test]
    fn weak_and_tiny_detections_are_ignored() {
        let mut deb = DetectionDebouncer::new(&config(1, 0));
        let weak = det(30, 0.3, 0);
        let mut tiny = det(30, 0.95, 0);
        tiny.bbox = BoundingBox::from([0.0, 0.0, 10.0, 10.0]);

        assert!(deb.observe(&[weak, tiny]).is_none());
        assert!(deb.candidate().is_none());
    }
}
