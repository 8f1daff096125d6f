//! Tipos compartilhados entre o link de telemetria, o debounce de detecções,
//! o motor de decisão e o despachante de alertas.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Fator de conversão m/s → mph.
pub const MPS_TO_MPH: f64 = 2.236_936;

/// Converte m/s para mph.
pub fn mps_to_mph(speed_mps: f64) -> f64 {
    speed_mps * MPS_TO_MPH
}

/// Converte mph para m/s.
pub fn mph_to_mps(speed_mph: f64) -> f64 {
    speed_mph / MPS_TO_MPH
}

// ──────────────────────────────────────────────
// Limites de velocidade
// ──────────────────────────────────────────────

/// Valor de uma placa de limite de velocidade (mph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeedLimit(pub u32);

impl SpeedLimit {
    pub fn mph(self) -> f64 {
        f64::from(self.0)
    }
}

impl fmt::Display for SpeedLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mph", self.0)
    }
}

// ──────────────────────────────────────────────
// Detecções
// ──────────────────────────────────────────────

/// Caixa delimitadora em pixels `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Uma detecção bruta do reconhecedor para um frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub label: SpeedLimit,
    /// Confiança do classificador (0–1)
    pub confidence: f32,
    pub frame_index: u64,
    pub bbox: BoundingBox,
}

/// Placa confirmada após N frames consecutivos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedSign {
    pub label: SpeedLimit,
    pub confirmed_at_frame: u64,
}

// ──────────────────────────────────────────────
// Estado do veículo
// ──────────────────────────────────────────────

/// De onde vem a velocidade usada nas decisões.
///
/// É também o indicador de conectividade exposto para a camada de render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedSource {
    /// Telemetria conectada e recente
    Telemetry,
    /// Telemetria ausente ou obsoleta: velocidade padrão configurada
    Fallback,
    /// Override manual do operador
    Manual,
}

impl SpeedSource {
    pub fn label(self) -> &'static str {
        match self {
            SpeedSource::Telemetry => "TELEMETRY",
            SpeedSource::Fallback => "FALLBACK",
            SpeedSource::Manual => "MANUAL",
        }
    }
}

/// Snapshot imutável e consistente do estado do veículo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub speed_mps: f64,
    pub position_x: f64,
    pub position_z: f64,
    /// Já considera a janela de obsolescência
    pub connected: bool,
    /// Instante da última mensagem de telemetria publicada
    pub last_update: Option<Instant>,
    pub source: SpeedSource,
}

impl VehicleState {
    pub fn speed_mph(&self) -> f64 {
        mps_to_mph(self.speed_mps)
    }
}

// ──────────────────────────────────────────────
// Alertas
// ──────────────────────────────────────────────

/// Classe de alerta. Cada classe tem seu próprio cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertClass {
    Overspeed,
    Temporary,
}

impl AlertClass {
    pub const ALL: [AlertClass; 2] = [AlertClass::Overspeed, AlertClass::Temporary];

    pub fn label(self) -> &'static str {
        match self {
            AlertClass::Overspeed => "OVERSPEED",
            AlertClass::Temporary => "TEMPORARY",
        }
    }
}

impl fmt::Display for AlertClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Detalhe de um alerta: limite do mapa e o valor observado
/// (velocidade do veículo para Overspeed, placa para Temporary).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertDetail {
    pub map_limit: SpeedLimit,
    pub observed_mph: f64,
}

/// Evento emitido pelo motor de decisão.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertEvent {
    pub class: AlertClass,
    pub detail: AlertDetail,
    pub timestamp: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversion_roundtrip() {
        let mph = mps_to_mph(10.0);
        assert!((mph - 22.369_36).abs() < 1e-6);
        assert!((mph_to_mps(mph) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn bbox_area_ignores_inverted_boxes() {
        let b = BoundingBox::from([10.0, 10.0, 34.0, 34.0]);
        assert_eq!(b.area(), 576.0);
        let inverted = BoundingBox::from([34.0, 34.0, 10.0, 10.0]);
        assert_eq!(inverted.area(), 0.0);
    }

    #[test]
    fn speed_limit_display() {
        assert_eq!(SpeedLimit(30).to_string(), "30 mph");
        assert_eq!(AlertClass::Temporary.to_string(), "TEMPORARY");
    }
}
