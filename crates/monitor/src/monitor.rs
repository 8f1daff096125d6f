//! Loop de decisão por frame.
//!
//! Tudo aqui roda no contexto do tick: debounce, rastreador de Overspeed,
//! cooldowns e estado do operador não são compartilhados. O único objeto
//! compartilhado é o [`VehicleStateCell`], lido por snapshot.

use speedsign_core::alerts::{AlertDispatcher, AlertRecord, SoundPlayer};
use speedsign_core::config::AppConfig;
use speedsign_core::debounce::DetectionDebouncer;
use speedsign_core::decision::{DecisionEngine, DecisionInput, OverspeedTracker};
use speedsign_core::operator::{OperatorCommand, OperatorState};
use speedsign_core::state::VehicleStateCell;
use speedsign_core::types::{AlertClass, ConfirmedSign, RawDetection, SpeedLimit, VehicleState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Resultado de um tick, para status e render.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub frame_index: u64,
    pub vehicle: VehicleState,
    pub top_detection: Option<RawDetection>,
    pub confirmed: Option<ConfirmedSign>,
    pub map_limit: SpeedLimit,
    pub is_overspeed: bool,
    pub is_temporary: bool,
    /// Classes efetivamente despachadas neste tick
    pub dispatched: Vec<AlertClass>,
}

pub struct SpeedMonitor<S: SoundPlayer> {
    vehicle: Arc<VehicleStateCell>,
    debouncer: DetectionDebouncer,
    engine: DecisionEngine,
    overspeed: OverspeedTracker,
    dispatcher: AlertDispatcher<S>,
    operator: OperatorState,

    frame_index: u64,
    status_interval: Duration,
    last_status: Option<Instant>,
}

impl<S: SoundPlayer> SpeedMonitor<S> {
    pub fn new(config: &AppConfig, vehicle: Arc<VehicleStateCell>, sound: S) -> Self {
        let dispatcher = AlertDispatcher::new(&config.alerts, sound)
            .with_overspeed_sound(!config.sounds.overspeed_sound.is_empty());

        Self {
            vehicle,
            debouncer: DetectionDebouncer::new(&config.detection),
            engine: DecisionEngine::new(&config.decision),
            overspeed: OverspeedTracker::new(),
            dispatcher,
            operator: OperatorState::new(&config.operator, config.link.fallback_speed_mph),
            frame_index: 0,
            status_interval: config.monitor.status_interval(),
            last_status: None,
        }
    }

    /// Índice que o próximo frame vai receber.
    pub fn next_frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Processa um frame: debounce → decisão → despacho.
    pub fn tick(&mut self, detections: &[RawDetection], now: Instant) -> TickReport {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        let vehicle = self.vehicle.snapshot(now);
        let map_limit = self.operator.map_limit();

        let top_detection = detections
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .copied();
        let newly_confirmed = self.debouncer.observe(detections);

        let input = DecisionInput {
            map_limit,
            vehicle_speed_mph: vehicle.speed_mph(),
            confirmed_sign: newly_confirmed,
        };
        let events = self.engine.evaluate(&input, &mut self.overspeed, now);

        let dispatched = events
            .iter()
            .filter(|e| self.dispatcher.dispatch(e))
            .map(|e| e.class)
            .collect();

        let confirmed = self.debouncer.current();
        let report = TickReport {
            frame_index,
            vehicle,
            top_detection,
            confirmed,
            map_limit,
            is_overspeed: events.iter().any(|e| e.class == AlertClass::Overspeed),
            is_temporary: confirmed.is_some_and(|c| self.engine.is_temporary(c.label, map_limit)),
            dispatched,
        };

        self.log_status(&report, now);
        report
    }

    /// Aplica um comando do operador. `false` = sair.
    pub fn handle_command(&mut self, cmd: OperatorCommand) -> bool {
        self.operator.apply(cmd, &self.vehicle)
    }

    pub fn operator(&self) -> &OperatorState {
        &self.operator
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_index
    }

    pub fn alerts(&self) -> &[AlertRecord] {
        self.dispatcher.records()
    }

    pub fn suppressed(&self, class: AlertClass) -> u64 {
        self.dispatcher.suppressed(class)
    }

    /// Linha de status periódica.
    fn log_status(&mut self, report: &TickReport, now: Instant) {
        if self
            .last_status
            .is_some_and(|t| now.saturating_duration_since(t) < self.status_interval)
        {
            return;
        }
        self.last_status = Some(now);

        let detected = report
            .top_detection
            .map_or_else(|| "--".to_string(), |d| format!("{} ({:.2})", d.label.0, d.confidence));
        let confirmed = report
            .confirmed
            .map_or_else(|| "--".to_string(), |c| c.label.0.to_string());

        info!(
            "[{:>5}] Velocidade: {:.0} mph [{}] | Detectado: {} | Confirmado: {} | Mapa: {} | Temp: {} | Overspeed: {}",
            report.frame_index,
            report.vehicle.speed_mph(),
            report.vehicle.source.label(),
            detected,
            confirmed,
            report.map_limit,
            report.is_temporary,
            report.is_overspeed,
        );
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use speedsign_core::alerts::Silent;
    use speedsign_core::protocol::TelemetryMessage;
    use speedsign_core::types::{BoundingBox, SpeedSource, mph_to_mps};

    const FRAME: Duration = Duration::from_millis(33);

    fn monitor() -> (SpeedMonitor<Silent>, Arc<VehicleStateCell>) {
        let config = AppConfig::default();
        let vehicle = Arc::new(VehicleStateCell::new(
            config.link.stale_timeout(),
            config.link.fallback_speed_mph,
        ));
        (SpeedMonitor::new(&config, Arc::clone(&vehicle), Silent), vehicle)
    }

    fn sign(label: u32) -> Vec<RawDetection> {
        vec![RawDetection {
            label: SpeedLimit(label),
            confidence: 0.9,
            frame_index: 0,
            bbox: BoundingBox::from([0.0, 0.0, 60.0, 60.0]),
        }]
    }

    fn set_map_limit(m: &mut SpeedMonitor<Silent>, target: u32) {
        while m.operator().map_limit() != SpeedLimit(target) {
            m.handle_command(OperatorCommand::CycleMapLimit);
        }
    }

    #[test]
    fn temporary_sign_fires_once_then_cooldown() {
        let (mut m, vehicle) = monitor();
        set_map_limit(&mut m, 50);
        let t0 = Instant::now();
        // Telemetria parada em 20 mph para não disparar Overspeed
        vehicle.publish(&TelemetryMessage::new(mph_to_mps(20.0), 0.0, 0.0), t0);

        let mut dispatched = Vec::new();
        let mut confirmations = 0;
        for i in 0..120u32 {
            let now = t0 + FRAME * i;
            if i % 10 == 0 {
                vehicle.publish(&TelemetryMessage::new(mph_to_mps(20.0), 0.0, 0.0), now);
            }
            // A placa some a cada 8 frames e é reconfirmada
            let frame = if i % 8 < 6 { sign(30) } else { Vec::new() };
            let report = m.tick(&frame, now);
            if report.confirmed.is_some() && report.is_temporary {
                confirmations += 1;
            }
            dispatched.extend(report.dispatched.into_iter().map(|c| (i, c)));
        }

        assert!(confirmations > 0);
        assert_eq!(dispatched, vec![(2, AlertClass::Temporary)]);
        assert!(m.suppressed(AlertClass::Temporary) >= 10);
        assert_eq!(m.alerts().len(), 1);
    }

    #[test]
    fn sustained_override_overspeed_fires_at_grace_boundary() {
        let (mut m, _vehicle) = monitor();
        set_map_limit(&mut m, 40);
        m.handle_command(OperatorCommand::SetOverride(45.0));
        m.handle_command(OperatorCommand::ToggleOverride);

        let t0 = Instant::now();
        let mut fired_at = Vec::new();
        // 1.2 s a ~30 fps
        for i in 0..=36u32 {
            let now = t0 + FRAME * i;
            let report = m.tick(&[], now);
            assert_eq!(report.vehicle.source, SpeedSource::Manual);
            if report.dispatched.contains(&AlertClass::Overspeed) {
                fired_at.push(now - t0);
            }
        }

        assert_eq!(fired_at.len(), 1);
        assert!(fired_at[0] >= Duration::from_secs(1));
        assert!(fired_at[0] < Duration::from_millis(1040));
    }

    #[test]
    fn disconnected_telemetry_uses_fallback_and_still_alerts() {
        let (mut m, vehicle) = monitor();
        set_map_limit(&mut m, 20);
        let t0 = Instant::now();
        vehicle.publish(&TelemetryMessage::new(mph_to_mps(10.0), 0.0, 0.0), t0);
        assert_eq!(vehicle.snapshot(t0).source, SpeedSource::Telemetry);

        // Telemetria cai; fallback de 30 mph > limite de 20
        vehicle.mark_disconnected();
        let mut overspeed = 0;
        for i in 0..60u32 {
            let report = m.tick(&[], t0 + FRAME * i);
            assert!(!report.vehicle.connected);
            assert_eq!(report.vehicle.source, SpeedSource::Fallback);
            overspeed += report.dispatched.len();
        }
        assert_eq!(overspeed, 1);
    }

    #[test]
    fn sign_at_map_limit_is_not_temporary() {
        let (mut m, _vehicle) = monitor();
        set_map_limit(&mut m, 30);
        let t0 = Instant::now();
        let reports: Vec<TickReport> = (0..5u32)
            .map(|i| m.tick(&sign(30), t0 + FRAME * i))
            .collect();
        assert!(reports.iter().all(|r| !r.is_temporary));
        assert_eq!(reports[4].confirmed.map(|c| c.label), Some(SpeedLimit(30)));
        assert!(m.alerts().is_empty());
    }

    #[test]
    fn quit_command_returns_false() {
        let (mut m, _vehicle) = monitor();
        assert!(!m.handle_command(OperatorCommand::Quit));
        assert_eq!(m.frames_processed(), 0);
    }
}
