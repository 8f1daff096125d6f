//! Protocolo de telemetria: JSON delimitado por linha sobre TCP.
//!
//! Formato de uma mensagem:
//!
//! ```text
//! {"speed_mps":8.333,"speed_mph":18.6,"pos_x":12.5,"pos_z":-3.2}\n
//! ```
//!
//! - `speed_mps`, `pos_x`, `pos_z` são obrigatórios
//! - `speed_mph` é redundante; recalculado a partir de `speed_mps` se ausente
//! - Campos extras (`speed_kph`, `ts`…) são ignorados
//! - Sem número de sequência: a última mensagem recebida vence
//!
//! O mesmo módulo decodifica os frames de detecção usados no replay
//! (um array JSON por linha, `[]` para frame vazio).

use crate::types::{mps_to_mph, BoundingBox, RawDetection, SpeedLimit};
use serde::{Deserialize, Serialize};

/// Tamanho máximo de uma linha. Linhas maiores são descartadas.
pub const MAX_LINE_BYTES: usize = 4096;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Linha muito longa ({0} bytes, máximo {max})", max = MAX_LINE_BYTES)]
    TooLong(usize),

    #[error("Linha vazia")]
    Empty,

    #[error("Campo {field} inválido: {value}")]
    InvalidField { field: &'static str, value: f64 },

    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// Uma mensagem de telemetria do veículo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub speed_mps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kph: Option<f64>,
    pub pos_x: f64,
    pub pos_z: f64,
    /// Timestamp UNIX do produtor (informativo)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
}

impl TelemetryMessage {
    pub fn new(speed_mps: f64, pos_x: f64, pos_z: f64) -> Self {
        Self {
            speed_mps,
            speed_mph: Some(mps_to_mph(speed_mps)),
            speed_kph: Some(speed_mps * 3.6),
            pos_x,
            pos_z,
            ts: None,
        }
    }

    /// Velocidade em mph, recalculada quando o produtor não envia.
    pub fn speed_mph(&self) -> f64 {
        self.speed_mph.unwrap_or_else(|| mps_to_mph(self.speed_mps))
    }
}

/// Codifica uma mensagem como linha JSON (com `\n`).
pub fn encode_message(msg: &TelemetryMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    line.push(b'\n');
    Ok(line)
}

/// Decodifica uma linha recebida (com ou sem `\n`).
///
/// Valida tamanho e que os campos obrigatórios são finitos.
pub fn decode_message(line: &[u8]) -> Result<TelemetryMessage, ProtocolError> {
    let line = trim_line(line)?;

    let msg: TelemetryMessage =
        serde_json::from_slice(line).map_err(|e| ProtocolError::Deserialize(e.to_string()))?;

    for (field, value) in [
        ("speed_mps", msg.speed_mps),
        ("pos_x", msg.pos_x),
        ("pos_z", msg.pos_z),
    ] {
        if !value.is_finite() {
            return Err(ProtocolError::InvalidField { field, value });
        }
    }
    if msg.speed_mps < 0.0 {
        return Err(ProtocolError::InvalidField {
            field: "speed_mps",
            value: msg.speed_mps,
        });
    }

    Ok(msg)
}

// ──────────────────────────────────────────────
// Frames de detecção (replay)
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DetectionRecord {
    label: u32,
    confidence: f32,
    #[serde(default)]
    bbox: BoundingBox,
}

/// Decodifica uma linha de replay em detecções brutas de um frame.
///
/// Uma linha vazia é um frame sem detecção.
pub fn decode_detection_frame(
    line: &[u8],
    frame_index: u64,
) -> Result<Vec<RawDetection>, ProtocolError> {
    let line = match trim_line(line) {
        Ok(l) => l,
        Err(ProtocolError::Empty) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let records: Vec<DetectionRecord> =
        serde_json::from_slice(line).map_err(|e| ProtocolError::Deserialize(e.to_string()))?;

    records
        .into_iter()
        .map(|r| {
            if !(0.0..=1.0).contains(&r.confidence) {
                return Err(ProtocolError::InvalidField {
                    field: "confidence",
                    value: f64::from(r.confidence),
                });
            }
            Ok(RawDetection {
                label: SpeedLimit(r.label),
                confidence: r.confidence,
                frame_index,
                bbox: r.bbox,
            })
        })
        .collect()
}

fn trim_line(line: &[u8]) -> Result<&[u8], ProtocolError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::TooLong(line.len()));
    }
    let line = line.trim_ascii();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(line)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
