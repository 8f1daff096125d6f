//! Configuração unificada via TOML.
//!
//! Um único `config.toml` construído uma vez na inicialização e passado por
//! referência para cada componente.

use crate::types::SpeedLimit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Erros de carregamento da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao salvar {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuração inválida: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Conexão com a fonte de telemetria do veículo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    /// Timeout de cada tentativa de conexão (segundos)
    pub connect_timeout_secs: f64,
    /// Intervalo de poll do socket; limita a latência do `stop()` (segundos)
    pub read_poll_secs: f64,
    /// Sem mensagens por este tempo → desconectado (segundos)
    pub stale_timeout_secs: f64,
    /// Espera inicial entre tentativas (segundos)
    pub retry_delay_secs: f64,
    /// Teto do backoff exponencial; igual ao `retry_delay_secs` = espera fixa
    pub retry_backoff_max_secs: f64,
    /// Velocidade usada sem telemetria (mph)
    pub fallback_speed_mph: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 65432,
            connect_timeout_secs: 2.0,
            read_poll_secs: 0.25,
            stale_timeout_secs: 2.0,
            retry_delay_secs: 1.0,
            retry_backoff_max_secs: 1.0,
            fallback_speed_mph: 30.0,
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_secs_f64(self.read_poll_secs)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.stale_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }

    pub fn retry_backoff_max(&self) -> Duration {
        Duration::from_secs_f64(self.retry_backoff_max_secs.max(self.retry_delay_secs))
    }
}

/// Filtro e debounce das detecções por frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// N frames consecutivos para confirmar uma placa
    pub confirm_frames: u32,
    /// K frames vazios consecutivos tolerados sem quebrar a sequência
    pub max_dropout_frames: u32,
    /// Detecções abaixo desta confiança são ignoradas
    pub min_confidence: f32,
    /// Caixas menores que isto (px²) são ignoradas
    pub min_box_area: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confirm_frames: 3,
            max_dropout_frames: 1,
            min_confidence: 0.60,
            min_box_area: 24.0 * 24.0,
        }
    }
}

/// Regras do motor de decisão.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Placa <= mapa - gap → alerta Temporary
    pub temporary_gap_mph: f64,
    /// Velocidade > mapa + tolerância → condição de Overspeed
    pub overspeed_tolerance_mph: f64,
    /// Tempo que a condição de Overspeed precisa se manter (segundos)
    pub overspeed_grace_secs: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            temporary_gap_mph: 10.0,
            overspeed_tolerance_mph: 0.0,
            overspeed_grace_secs: 1.0,
        }
    }
}

impl DecisionConfig {
    pub fn overspeed_grace(&self) -> Duration {
        Duration::from_secs_f64(self.overspeed_grace_secs)
    }
}

/// Cooldown por classe de alerta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub overspeed_cooldown_secs: f64,
    pub temporary_cooldown_secs: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            overspeed_cooldown_secs: 5.0,
            temporary_cooldown_secs: 5.0,
        }
    }
}

/// Configuração de sons de alerta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub enabled: bool,
    /// Players tentados em ordem; o primeiro que funcionar vence
    pub players: Vec<String>,
    /// Arquivo tocado no alerta Temporary
    pub temporary_sound: String,
    /// Arquivo tocado no alerta Overspeed (vazio = sem som)
    pub overspeed_sound: String,
    /// Sons pendentes além disto são descartados
    pub queue_size: usize,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            players: vec!["paplay".into(), "aplay".into(), "afplay".into()],
            temporary_sound: "/usr/share/sounds/freedesktop/stereo/bell.oga".into(),
            overspeed_sound: String::new(),
            queue_size: 4,
        }
    }
}

/// Controles do operador.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Conjunto ciclado pelo comando "próximo limite"
    pub map_limits: Vec<SpeedLimit>,
    pub initial_map_limit: SpeedLimit,
    /// Passo do ajuste de override (mph)
    pub override_step_mph: f64,
    pub override_max_mph: f64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            map_limits: [20, 30, 40, 50, 60, 70].into_iter().map(SpeedLimit).collect(),
            initial_map_limit: SpeedLimit(30),
            override_step_mph: 5.0,
            override_max_mph: 100.0,
        }
    }
}

/// Loop principal do monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Ticks por segundo
    pub frame_rate: f64,
    /// Intervalo da linha de status (segundos)
    pub status_interval_secs: f64,
    /// Arquivo JSON-lines com detecções por frame (vazio = sem detecções)
    pub detection_replay: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            status_interval_secs: 1.0,
            detection_replay: String::new(),
        }
    }
}

impl MonitorConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs_f64(self.status_interval_secs)
    }
}

/// Simulador de telemetria.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub bind_host: String,
    pub port: u16,
    /// Intervalo de envio (segundos)
    pub interval_secs: f64,
    /// Velocidades de cruzeiro ciclicas (mph)
    pub speed_profile_mph: Vec<f64>,
    /// Tempo em cada velocidade do perfil (segundos)
    pub segment_secs: f64,
    /// Aceleração máxima (m/s²)
    pub max_accel_mps2: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".into(),
            port: 65432,
            interval_secs: 0.1,
            speed_profile_mph: vec![31.0, 45.0, 25.0],
            segment_secs: 10.0,
            max_accel_mps2: 2.5,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub detection: DetectionConfig,
    pub decision: DecisionConfig,
    pub alerts: AlertConfig,
    pub sounds: SoundConfig,
    pub operator: OperatorConfig,
    pub monitor: MonitorConfig,
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente → padrão. Arquivo ilegível ou inválido → erro.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} não encontrado, usando configuração padrão", path.display());
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<AppConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração carregada de {}", path.display());
        Ok(config)
    }

    /// Carrega e valida; falha se qualquer valor for inválido.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Caminho vindo de `--config <path>`, ou o padrão.
    pub fn path_from_args<I: IntoIterator<Item = String>>(args: I) -> PathBuf {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--config" {
                if let Some(path) = args.next() {
                    return PathBuf::from(path);
                }
            } else if let Some(path) = arg.strip_prefix("--config=") {
                return PathBuf::from(path);
            }
        }
        Self::default_path()
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // ── Link ──
        let link = &self.link;
        if link.port == 0 {
            errors.push("Porta do link não pode ser 0".into());
        }
        if link.host.trim().is_empty() {
            errors.push("Host do link não pode ser vazio".into());
        }
        for (name, value) in [
            ("link.connect_timeout_secs", link.connect_timeout_secs),
            ("link.read_poll_secs", link.read_poll_secs),
            ("link.stale_timeout_secs", link.stale_timeout_secs),
            ("link.retry_delay_secs", link.retry_delay_secs),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                errors.push(format!("{name} deve ser > 0 (atual: {value})"));
            }
        }
        if !(link.retry_backoff_max_secs >= 0.0 && link.retry_backoff_max_secs.is_finite()) {
            errors.push(format!(
                "link.retry_backoff_max_secs inválido: {}",
                link.retry_backoff_max_secs
            ));
        }
        if link.read_poll_secs > link.stale_timeout_secs {
            errors.push(format!(
                "link.read_poll_secs ({}) maior que link.stale_timeout_secs ({})",
                link.read_poll_secs, link.stale_timeout_secs
            ));
        }
        if !(link.fallback_speed_mph >= 0.0 && link.fallback_speed_mph.is_finite()) {
            errors.push(format!(
                "Velocidade de fallback inválida: {}",
                link.fallback_speed_mph
            ));
        }

        // ── Detecção ──
        let det = &self.detection;
        if det.confirm_frames == 0 {
            errors.push("detection.confirm_frames deve ser >= 1".into());
        }
        if !(0.0..=1.0).contains(&det.min_confidence) {
            errors.push(format!(
                "detection.min_confidence fora de 0–1: {}",
                det.min_confidence
            ));
        }
        if !(det.min_box_area >= 0.0) {
            errors.push(format!("detection.min_box_area inválida: {}", det.min_box_area));
        }

        // ── Decisão / alertas ──
        for (name, value) in [
            ("decision.temporary_gap_mph", self.decision.temporary_gap_mph),
            ("decision.overspeed_tolerance_mph", self.decision.overspeed_tolerance_mph),
            ("decision.overspeed_grace_secs", self.decision.overspeed_grace_secs),
            ("alerts.overspeed_cooldown_secs", self.alerts.overspeed_cooldown_secs),
            ("alerts.temporary_cooldown_secs", self.alerts.temporary_cooldown_secs),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                errors.push(format!("{name} deve ser >= 0 (atual: {value})"));
            }
        }

        // ── Sons ──
        if self.sounds.enabled && self.sounds.queue_size == 0 {
            errors.push("sounds.queue_size deve ser >= 1".into());
        }

        // ── Operador ──
        let op = &self.operator;
        if op.map_limits.is_empty() {
            errors.push("operator.map_limits não pode ser vazio".into());
        } else if !op.map_limits.contains(&op.initial_map_limit) {
            errors.push(format!(
                "operator.initial_map_limit ({}) fora de operator.map_limits",
                op.initial_map_limit
            ));
        }
        if !(op.override_step_mph > 0.0) || !(op.override_max_mph > 0.0) {
            errors.push("operator.override_step_mph e override_max_mph devem ser > 0".into());
        }

        // ── Monitor ──
        if !(self.monitor.frame_rate > 0.0 && self.monitor.frame_rate <= 240.0) {
            errors.push(format!(
                "monitor.frame_rate inválido: {} (0–240)",
                self.monitor.frame_rate
            ));
        }
        if !(self.monitor.status_interval_secs > 0.0) {
            errors.push("monitor.status_interval_secs deve ser > 0".into());
        }

        // ── Simulador ──
        if self.simulator.port == 0 {
            errors.push("Porta do simulador não pode ser 0".into());
        }
        if self.simulator.interval_secs < 0.01 || self.simulator.interval_secs > 10.0 {
            errors.push(format!(
                "Intervalo do simulador inválido: {} (0.01–10.0)",
                self.simulator.interval_secs
            ));
        }
        if self.simulator.speed_profile_mph.is_empty() {
            errors.push("simulator.speed_profile_mph não pode ser vazio".into());
        }
        if !(self.simulator.segment_secs > 0.0 && self.simulator.segment_secs.is_finite()) {
            errors.push(format!(
                "simulator.segment_secs inválido: {}",
                self.simulator.segment_secs
            ));
        }
        if !(self.simulator.max_accel_mps2 >= 0.0 && self.simulator.max_accel_mps2.is_finite()) {
            errors.push(format!(
                "simulator.max_accel_mps2 inválido: {}",
                self.simulator.max_accel_mps2
            ));
        }

        errors
    }
}
