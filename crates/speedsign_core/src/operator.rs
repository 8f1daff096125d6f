//! Comandos do operador: limite do mapa e override manual de velocidade.
//!
//! Os comandos chegam já decodificados; o mapeamento de teclas fica na
//! camada de entrada ([`OperatorCommand::from_key`] é só uma conveniência).

use crate::config::OperatorConfig;
use crate::state::VehicleStateCell;
use crate::types::SpeedLimit;
use tracing::info;

/// Intenção do operador.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorCommand {
    /// Próximo limite do conjunto (20 → 30 → … → 70 → 20)
    CycleMapLimit,
    ToggleOverride,
    /// Soma (ou subtrai) mph ao override; ignorado com override inativo
    AdjustOverride(f64),
    SetOverride(f64),
    Quit,
}

impl OperatorCommand {
    /// `m` limite, `t` override, `w`/`s` ±passo, `0`–`9` ×10 mph, `q` sair.
    pub fn from_key(key: char, step_mph: f64) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'm' => Some(Self::CycleMapLimit),
            't' => Some(Self::ToggleOverride),
            'w' => Some(Self::AdjustOverride(step_mph)),
            's' => Some(Self::AdjustOverride(-step_mph)),
            'q' => Some(Self::Quit),
            d @ '0'..='9' => d.to_digit(10).map(|n| Self::SetOverride(f64::from(n) * 10.0)),
            _ => None,
        }
    }
}

/// Estado controlado pelo operador; vive no contexto do tick.
#[derive(Debug, Clone)]
pub struct OperatorState {
    map_limits: Vec<SpeedLimit>,
    map_limit: SpeedLimit,
    override_active: bool,
    override_speed_mph: f64,
    override_max_mph: f64,
}

impl OperatorState {
    /// O override começa inativo, pré-carregado com a velocidade de fallback.
    pub fn new(config: &OperatorConfig, initial_override_mph: f64) -> Self {
        Self {
            map_limits: config.map_limits.clone(),
            map_limit: config.initial_map_limit,
            override_active: false,
            override_speed_mph: initial_override_mph.clamp(0.0, config.override_max_mph),
            override_max_mph: config.override_max_mph,
        }
    }

    pub fn map_limit(&self) -> SpeedLimit {
        self.map_limit
    }

    pub fn override_active(&self) -> bool {
        self.override_active
    }

    pub fn override_speed_mph(&self) -> f64 {
        self.override_speed_mph
    }

    /// Aplica um comando e propaga o override para o estado do veículo.
    ///
    /// Retorna `false` quando o comando é `Quit`.
    pub fn apply(&mut self, cmd: OperatorCommand, vehicle: &VehicleStateCell) -> bool {
        match cmd {
            OperatorCommand::Quit => return false,
            OperatorCommand::CycleMapLimit => {
                let idx = self
                    .map_limits
                    .iter()
                    .position(|&l| l == self.map_limit)
                    .map_or(0, |i| (i + 1) % self.map_limits.len());
                if let Some(&next) = self.map_limits.get(idx) {
                    self.map_limit = next;
                }
                info!("Limite do mapa → {}", self.map_limit);
            }
            OperatorCommand::ToggleOverride => {
                self.override_active = !self.override_active;
                info!(
                    "Override manual {} ({:.0} mph)",
                    if self.override_active { "ON" } else { "OFF" },
                    self.override_speed_mph
                );
            }
            OperatorCommand::AdjustOverride(delta) => {
                if !self.override_active {
                    return true;
                }
                self.set_override_speed(self.override_speed_mph + delta);
            }
            OperatorCommand::SetOverride(mph) => {
                self.set_override_speed(mph);
            }
        }

        vehicle.set_manual_override(self.override_active.then_some(self.override_speed_mph));
        true
    }

    fn set_override_speed(&mut self, mph: f64) {
        self.override_speed_mph = mph.clamp(0.0, self.override_max_mph);
        info!("Velocidade do override → {:.0} mph", self.override_speed_mph);
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
