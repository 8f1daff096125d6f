//! Sistema de alertas – cooldown por classe e despacho dos efeitos.
//!
//! O despachante pertence ao tick: nada aqui é compartilhado entre threads.
//! O som é um colaborador externo ([`SoundPlayer`]) e sempre best-effort;
//! falha de áudio nunca impede a mensagem no console.

use crate::config::AlertConfig;
use crate::types::{AlertClass, AlertDetail, AlertEvent};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Erros de reprodução de som.
#[derive(Debug, thiserror::Error)]
pub enum SoundError {
    #[error("Fila de som cheia, descartando alerta sonoro")]
    QueueFull,

    #[error("Worker de som encerrado")]
    Disconnected,

    #[error("Nenhum player de áudio disponível")]
    Unavailable,

    #[error("Erro de I/O ao tocar som: {0}")]
    Io(#[from] std::io::Error),
}

/// Capacidade externa de tocar um aviso sonoro.
///
/// Implementações não podem bloquear o chamador além de um tempo curto.
pub trait SoundPlayer {
    fn play(&self, class: AlertClass) -> Result<(), SoundError>;
}

/// Sem áudio: apenas console.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl SoundPlayer for Silent {
    fn play(&self, _class: AlertClass) -> Result<(), SoundError> {
        Ok(())
    }
}

impl<S: SoundPlayer + ?Sized> SoundPlayer for Box<S> {
    fn play(&self, class: AlertClass) -> Result<(), SoundError> {
        (**self).play(class)
    }
}

// ──────────────────────────────────────────────
// Cooldown
// ──────────────────────────────────────────────

/// Último disparo de uma classe de alerta.
#[derive(Debug, Clone)]
pub struct CooldownTimer {
    cooldown: Duration,
    last_fired: Option<Instant>,
}

impl CooldownTimer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: None,
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.last_fired
            .is_none_or(|t| now.saturating_duration_since(t) >= self.cooldown)
    }

    /// Tempo até o próximo disparo permitido.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.last_fired.map_or(Duration::ZERO, |t| {
            self.cooldown
                .saturating_sub(now.saturating_duration_since(t))
        })
    }

    fn fire(&mut self, now: Instant) {
        self.last_fired = Some(now);
    }
}

/// Um alerta efetivamente despachado.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub class: AlertClass,
    pub detail: AlertDetail,
    pub fired_at: Instant,
    pub message: String,
}

/// Aplica cooldown por classe e dispara console + som.
pub struct AlertDispatcher<S: SoundPlayer> {
    overspeed: CooldownTimer,
    temporary: CooldownTimer,
    sound: S,
    overspeed_audible: bool,
    records: Vec<AlertRecord>,
    suppressed: [u64; 2],
}

impl<S: SoundPlayer> AlertDispatcher<S> {
    pub fn new(config: &AlertConfig, sound: S) -> Self {
        Self {
            overspeed: CooldownTimer::new(Duration::from_secs_f64(config.overspeed_cooldown_secs)),
            temporary: CooldownTimer::new(Duration::from_secs_f64(config.temporary_cooldown_secs)),
            sound,
            overspeed_audible: false,
            records: Vec::new(),
            suppressed: [0; 2],
        }
    }

    /// Também toca som em alertas de Overspeed (por padrão só Temporary).
    pub fn with_overspeed_sound(mut self, audible: bool) -> Self {
        self.overspeed_audible = audible;
        self
    }

    /// Despacha um evento, usando `event.timestamp` como "agora".
    ///
    /// Retorna `false` se o evento caiu dentro do cooldown da sua classe.
    pub fn dispatch(&mut self, event: &AlertEvent) -> bool {
        let now = event.timestamp;
        let timer = self.timer_mut(event.class);
        if !timer.is_ready(now) {
            let remaining = timer.remaining(now);
            self.suppressed[Self::slot(event.class)] += 1;
            debug!(
                class = %event.class,
                remaining_ms = remaining.as_millis() as u64,
                "Alerta suprimido (cooldown)"
            );
            return false;
        }
        timer.fire(now);

        let message = format_message(event);
        warn!(
            class = %event.class,
            map_limit_mph = event.detail.map_limit.0,
            observed_mph = event.detail.observed_mph,
            "{message}"
        );
        print_banner(event.class, &message);

        let audible = match event.class {
            AlertClass::Temporary => true,
            AlertClass::Overspeed => self.overspeed_audible,
        };
        if audible {
            if let Err(e) = self.sound.play(event.class) {
                debug!("Som de alerta indisponível: {e}");
            }
        }

        self.records.push(AlertRecord {
            class: event.class,
            detail: event.detail,
            fired_at: now,
            message,
        });
        true
    }

    /// Alertas despachados nesta sessão.
    pub fn records(&self) -> &[AlertRecord] {
        &self.records
    }

    /// Eventos descartados por cooldown.
    pub fn suppressed(&self, class: AlertClass) -> u64 {
        self.suppressed[Self::slot(class)]
    }

    pub fn cooldown(&self, class: AlertClass) -> &CooldownTimer {
        match class {
            AlertClass::Overspeed => &self.overspeed,
            AlertClass::Temporary => &self.temporary,
        }
    }

    pub fn sound(&self) -> &S {
        &self.sound
    }

    fn timer_mut(&mut self, class: AlertClass) -> &mut CooldownTimer {
        match class {
            AlertClass::Overspeed => &mut self.overspeed,
            AlertClass::Temporary => &mut self.temporary,
        }
    }

    fn slot(class: AlertClass) -> usize {
        match class {
            AlertClass::Overspeed => 0,
            AlertClass::Temporary => 1,
        }
    }
}

/// Mensagem legível de um alerta.
pub fn format_message(event: &AlertEvent) -> String {
    let d = &event.detail;
    match event.class {
        AlertClass::Overspeed => format!(
            "Overspeed: {:.1} mph numa zona de {} – reduza a velocidade",
            d.observed_mph, d.map_limit
        ),
        AlertClass::Temporary => format!(
            "Limite temporário: placa de {:.0} mph (mapa {}) – possível obra ou zona escolar",
            d.observed_mph, d.map_limit
        ),
    }
}

fn print_banner(class: AlertClass, message: &str) {
    let color = match class {
        AlertClass::Overspeed => "\x1b[91m",
        AlertClass::Temporary => "\x1b[93m",
    };
    println!();
    println!("{color}══════════════════════════════════════════════");
    println!("   ⚠ {}", class.label());
    println!("   {message}");
    println!("══════════════════════════════════════════════\x1b[0m");
    println!();
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
