//! Som de alerta em thread própria.
//!
//! `play()` só enfileira (`try_send`); o worker tenta os players configurados
//! em ordem e, se nenhum funcionar, cai no bell do terminal. Um player lento
//! atrasa apenas o próximo som, nunca o tick.

use crossbeam_channel::{Sender, TrySendError, bounded};
use speedsign_core::alerts::{SoundError, SoundPlayer};
use speedsign_core::config::SoundConfig;
use speedsign_core::types::AlertClass;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Player de sistema (paplay/aplay/afplay…) com fila limitada.
pub struct SystemSound {
    tx: Option<Sender<AlertClass>>,
    handle: Option<JoinHandle<()>>,
}

impl SystemSound {
    pub fn spawn(config: &SoundConfig) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<AlertClass>(config.queue_size.max(1));
        let players = config.players.clone();
        let temporary_sound = config.temporary_sound.clone();
        let overspeed_sound = config.overspeed_sound.clone();

        let handle = std::thread::Builder::new()
            .name("alert-sound".into())
            .spawn(move || {
                for class in rx {
                    let file = match class {
                        AlertClass::Temporary => &temporary_sound,
                        AlertClass::Overspeed => &overspeed_sound,
                    };
                    if file.is_empty() {
                        continue;
                    }
                    if !play_with_any(&players, file) {
                        terminal_bell();
                    }
                }
                debug!("Worker de som finalizado");
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }
}

impl SoundPlayer for SystemSound {
    fn play(&self, class: AlertClass) -> Result<(), SoundError> {
        let Some(tx) = &self.tx else {
            return Err(SoundError::Disconnected);
        };
        tx.try_send(class).map_err(|e| match e {
            TrySendError::Full(_) => SoundError::QueueFull,
            TrySendError::Disconnected(_) => SoundError::Disconnected,
        })
    }
}

impl Drop for SystemSound {
    fn drop(&mut self) {
        // Fecha o channel; o worker termina os sons pendentes e sai
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker de som terminou com pânico");
            }
        }
    }
}

/// Tenta cada player até um terminar com sucesso.
fn play_with_any(players: &[String], file: &str) -> bool {
    players.iter().any(|player| {
        match Command::new(player)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => true,
            Ok(status) => {
                debug!("{player} {file} saiu com {status}");
                false
            }
            Err(e) => {
                debug!("{player} indisponível: {e}");
                false
            }
        }
    })
}

fn terminal_bell() {
    let mut out = std::io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}
