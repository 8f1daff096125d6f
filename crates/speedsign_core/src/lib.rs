//! # Speed Sign Core
//!
//! Crate compartilhada do monitor de placas de velocidade: tipos, protocolo
//! de telemetria (JSON por linha), configuração TOML e o núcleo de decisão
//! executado a cada frame.
//!
//! ## Módulos
//! - [`types`] – Placas, detecções, estado do veículo, eventos de alerta
//! - [`protocol`] – Encode/decode das linhas de telemetria e de replay
//! - [`config`] – Configuração unificada via TOML
//! - [`state`] – Estado do veículo compartilhado (snapshot consistente)
//! - [`debounce`] – Confirmação de placas por N frames consecutivos
//! - [`decision`] – Regras de Overspeed e Temporary
//! - [`alerts`] – Cooldown por classe e despacho (console + som)
//! - [`operator`] – Comandos do operador (limite do mapa, override)

pub mod types;
pub mod protocol;
pub mod config;
pub mod state;
pub mod debounce;
pub mod decision;
pub mod alerts;
pub mod operator;

// Re-exports convenientes
pub use alerts::{AlertDispatcher, SoundError, SoundPlayer};
pub use config::{AppConfig, ConfigError};
pub use debounce::DetectionDebouncer;
pub use decision::{DecisionEngine, DecisionInput, OverspeedTracker};
pub use protocol::{decode_message, encode_message, TelemetryMessage};
pub use state::VehicleStateCell;
pub use types::{AlertClass, AlertEvent, SpeedLimit, SpeedSource, VehicleState};
