//! Veículo simulado – perfil de velocidade cíclico com aceleração limitada.
//!
//! Não é um modelo físico: só produz velocidade e posição plausíveis para
//! exercitar o monitor.

use speedsign_core::config::SimulatorConfig;
use speedsign_core::protocol::TelemetryMessage;
use speedsign_core::types::mph_to_mps;

/// Raio da pista circular (m).
const TRACK_RADIUS_M: f64 = 150.0;

pub struct SimVehicle {
    profile_mps: Vec<f64>,
    segment_secs: f64,
    max_accel_mps2: f64,

    speed_mps: f64,
    /// Distância percorrida na pista (m)
    distance_m: f64,
    elapsed_secs: f64,
}

impl SimVehicle {
    pub fn new(config: &SimulatorConfig) -> Self {
        let profile_mps: Vec<f64> = config
            .speed_profile_mph
            .iter()
            .map(|&mph| mph_to_mps(mph.max(0.0)))
            .collect();
        Self {
            speed_mps: profile_mps.first().copied().unwrap_or(0.0),
            profile_mps,
            segment_secs: config.segment_secs.max(0.1),
            max_accel_mps2: config.max_accel_mps2.max(0.0),
            distance_m: 0.0,
            elapsed_secs: 0.0,
        }
    }

    /// Velocidade alvo do segmento atual do perfil.
    pub fn target_mps(&self) -> f64 {
        if self.profile_mps.is_empty() {
            return 0.0;
        }
        let segment = (self.elapsed_secs / self.segment_secs) as usize % self.profile_mps.len();
        self.profile_mps[segment]
    }

    /// Avança a simulação `dt` segundos.
    pub fn step(&mut self, dt: f64) {
        self.elapsed_secs += dt;
        let target = self.target_mps();
        let max_delta = self.max_accel_mps2 * dt;
        let delta = (target - self.speed_mps).clamp(-max_delta, max_delta);
        self.speed_mps = (self.speed_mps + delta).max(0.0);
        self.distance_m += self.speed_mps * dt;
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    /// Posição (x, z) na pista circular.
    pub fn position(&self) -> (f64, f64) {
        let angle = self.distance_m / TRACK_RADIUS_M;
        (TRACK_RADIUS_M * angle.cos(), TRACK_RADIUS_M * angle.sin())
    }

    pub fn message(&self, ts: f64) -> TelemetryMessage {
        let (x, z) = self.position();
        let mut msg = TelemetryMessage::new(
            round_to(self.speed_mps(), 3),
            round_to(x, 2),
            round_to(z, 2),
        );
        msg.ts = Some(ts);
        msg
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
