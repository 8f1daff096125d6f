//! Estado do veículo compartilhado entre a thread de telemetria e o tick.
//!
//! Escritores nunca entregam referências internas: toda leitura devolve uma
//! cópia [`VehicleState`] consistente, tirada sob um lock de microssegundos.

use crate::protocol::TelemetryMessage;
use crate::types::{mph_to_mps, SpeedSource, VehicleState};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Inner {
    speed_mps: f64,
    position_x: f64,
    position_z: f64,
    connected: bool,
    last_update: Option<Instant>,
    /// Velocidade do override manual (m/s); `Some` = override ativo
    manual_override_mps: Option<f64>,
}

/// Dono único do estado do veículo.
///
/// Escrito pelo link de telemetria ([`publish`](Self::publish)) ou pelo
/// operador ([`set_manual_override`](Self::set_manual_override)); com o
/// override ativo, publicações da telemetria são ignoradas.
#[derive(Debug)]
pub struct VehicleStateCell {
    inner: Mutex<Inner>,
    stale_timeout: Duration,
    fallback_speed_mps: f64,
}

impl VehicleStateCell {
    pub fn new(stale_timeout: Duration, fallback_speed_mph: f64) -> Self {
        let fallback_speed_mps = mph_to_mps(fallback_speed_mph);
        Self {
            inner: Mutex::new(Inner {
                speed_mps: fallback_speed_mps,
                position_x: 0.0,
                position_z: 0.0,
                connected: false,
                last_update: None,
                manual_override_mps: None,
            }),
            stale_timeout,
            fallback_speed_mps,
        }
    }

    /// Publica uma mensagem de telemetria. Retorna `false` se o override
    /// manual está ativo e a escrita foi descartada.
    pub fn publish(&self, msg: &TelemetryMessage, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        if inner.manual_override_mps.is_some() {
            return false;
        }
        inner.speed_mps = msg.speed_mps;
        inner.position_x = msg.pos_x;
        inner.position_z = msg.pos_z;
        inner.connected = true;
        inner.last_update = Some(now);
        true
    }

    /// Marca a telemetria como desconectada (perda de conexão, erro de leitura).
    pub fn mark_disconnected(&self) {
        self.inner.lock().connected = false;
    }

    /// Ativa (`Some(mph)`) ou desativa (`None`) o override manual.
    pub fn set_manual_override(&self, speed_mph: Option<f64>) {
        self.inner.lock().manual_override_mps = speed_mph.map(mph_to_mps);
    }

    pub fn manual_override_active(&self) -> bool {
        self.inner.lock().manual_override_mps.is_some()
    }

    /// Snapshot consistente, já resolvendo a fonte de velocidade.
    ///
    /// - override ativo → velocidade manual
    /// - conectado e recente → velocidade da telemetria
    /// - caso contrário → velocidade de fallback, `connected = false`
    pub fn snapshot(&self, now: Instant) -> VehicleState {
        let inner = self.inner.lock();

        let fresh = inner
            .last_update
            .is_some_and(|t| now.saturating_duration_since(t) < self.stale_timeout);
        let connected = inner.connected && fresh;

        let (speed_mps, source) = match inner.manual_override_mps {
            Some(manual) => (manual, SpeedSource::Manual),
            None if connected => (inner.speed_mps, SpeedSource::Telemetry),
            None => (self.fallback_speed_mps, SpeedSource::Fallback),
        };

        VehicleState {
            speed_mps,
            position_x: inner.position_x,
            position_z: inner.position_z,
            connected,
            last_update: inner.last_update,
            source,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
