//! # Speed Sign Monitor
//!
//! Funde a telemetria de velocidade do veículo (TCP, JSON por linha) com as
//! detecções de placas por frame e dispara dois alertas:
//! - **Overspeed**: velocidade acima do limite do mapa por mais que a carência
//! - **Temporary**: placa confirmada bem abaixo do limite do mapa (com som)
//!
//! ## Uso
//! ```bash
//! speedsign_monitor                        # config.toml ao lado do executável
//! speedsign_monitor --config sim.toml
//! ```
//!
//! ## Comandos (stdin, Enter após cada linha)
//! - `m`: Próximo limite do mapa
//! - `t`: Liga/desliga override manual de velocidade
//! - `w` / `s`: ±5 mph no override
//! - `0`–`9`: Override em 0–90 mph
//! - `q`: Sair (ou Ctrl-C)

mod detections;
mod input;
mod monitor;
mod sound;
mod telemetry_link;

use detections::{FrameSource, NoDetections, ReplaySource};
use monitor::SpeedMonitor;
use sound::SystemSound;
use speedsign_core::alerts::{Silent, SoundPlayer};
use speedsign_core::config::AppConfig;
use speedsign_core::state::VehicleStateCell;
use speedsign_core::types::AlertClass;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use telemetry_link::TelemetryLink;
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config (falha rápido se inválida) ──
    let config_path = AppConfig::path_from_args(std::env::args().skip(1));
    let config = match AppConfig::load_validated(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    // ── Estado do veículo + link de telemetria ──
    let vehicle = Arc::new(VehicleStateCell::new(
        config.link.stale_timeout(),
        config.link.fallback_speed_mph,
    ));
    let mut link = TelemetryLink::start(&config.link, Arc::clone(&vehicle))?;

    // ── Som ──
    let sound: Box<dyn SoundPlayer> = if config.sounds.enabled {
        match SystemSound::spawn(&config.sounds) {
            Ok(s) => Box::new(s),
            Err(e) => {
                warn!("Som indisponível ({e}), alertas apenas no console");
                Box::new(Silent)
            }
        }
    } else {
        Box::new(Silent)
    };

    // ── Fonte de detecções ──
    let mut frames: Box<dyn FrameSource> = if config.monitor.detection_replay.is_empty() {
        info!("Sem replay de detecções configurado: frames vazios");
        Box::new(NoDetections)
    } else {
        Box::new(ReplaySource::open(Path::new(&config.monitor.detection_replay))?)
    };

    // ── Entrada do operador + Ctrl-C ──
    let commands = input::spawn_stdin_reader(config.operator.override_step_mph)?;
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    let link_stop = link.stop_handle();
    ctrlc::set_handler(move || {
        info!("Sinal de parada recebido...");
        r.store(false, Ordering::SeqCst);
        link_stop.stop();
    })?;

    let mut monitor = SpeedMonitor::new(&config, Arc::clone(&vehicle), sound);

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ SPEED SIGN MONITOR – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Telemetria: {}:{}", config.link.host, config.link.port);
    println!("  Fallback:   {:.0} mph", config.link.fallback_speed_mph);
    println!("  Mapa:       {}", monitor.operator().map_limit());
    println!("  Frames:     {:.0} fps", config.monitor.frame_rate);
    println!("  Comandos:   m=mapa t=override w/s=±speed 0-9=override q=sair");
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let frame_interval = config.monitor.frame_interval();
    let session_start = Instant::now();
    let mut source_open = true;
    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        while let Ok(cmd) = commands.try_recv() {
            if !monitor.handle_command(cmd) {
                running.store(false, Ordering::SeqCst);
            }
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        // Sem frames não há tick: o monitor fica ocioso até q / Ctrl-C
        if source_open {
            match frames.next_frame(monitor.next_frame_index()) {
                Some(detections) => {
                    monitor.tick(&detections, Instant::now());
                }
                None => {
                    info!("Fonte de detecções encerrada – monitor ocioso (q ou Ctrl-C para sair)");
                    source_open = false;
                }
            }
        }

        // Dormir pelo tempo restante do frame
        let elapsed = cycle_start.elapsed();
        if elapsed < frame_interval {
            std::thread::sleep(frame_interval - elapsed);
        }
    }

    // ── Shutdown ──
    info!("Encerrando...");
    let last_state = link.current_state();
    link.stop();

    println!();
    println!("══════════════════════════════════════════════");
    println!("   RESUMO DA SESSÃO");
    println!("══════════════════════════════════════════════");
    println!("  Frames processados: {}", monitor.frames_processed());
    println!("  Fonte final:        {}", last_state.source.label());
    println!("  Alertas disparados: {}", monitor.alerts().len());
    println!(
        "  Suprimidos:         {} overspeed | {} temporary",
        monitor.suppressed(AlertClass::Overspeed),
        monitor.suppressed(AlertClass::Temporary)
    );
    for alert in monitor.alerts() {
        let offset = alert.fired_at.saturating_duration_since(session_start).as_secs_f64();
        println!("    [+{offset:>7.1}s] {}: {}", alert.class, alert.message);
    }
    println!("══════════════════════════════════════════════");

    // Fecha o worker de som antes de sair
    drop(monitor);
    Ok(())
}
