//! # Speed Sign Simulator
//!
//! Simula a telemetria do veículo e a publica por TCP, uma linha JSON por
//! mensagem, para o `speedsign_monitor`.
//!
//! ## Uso
//! ```bash
//! speedsign_simulator                     # config.toml ao lado do executável
//! speedsign_simulator --config sim.toml
//! ```

mod broadcast;
mod vehicle;

use broadcast::Broadcaster;
use speedsign_core::config::AppConfig;
use speedsign_core::protocol::encode_message;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use vehicle::SimVehicle;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::path_from_args(std::env::args().skip(1));
    let config = match AppConfig::load_validated(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let sim_cfg = &config.simulator;
    let interval = Duration::from_secs_f64(sim_cfg.interval_secs);
    let bind_addr = format!("{}:{}", sim_cfg.bind_host, sim_cfg.port);

    // ── Servidor TCP ──
    let mut server = Broadcaster::bind(&bind_addr)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Sinal de parada recebido...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut vehicle = SimVehicle::new(sim_cfg);

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🚗 SPEED SIGN SIMULATOR – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Escutando: {}", server.local_addr()?);
    println!("  Intervalo: {:.2}s", sim_cfg.interval_secs);
    println!("  Perfil:    {:?} mph / {:.0}s", sim_cfg.speed_profile_mph, sim_cfg.segment_secs);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut last_step = Instant::now();
    let mut sent_lines: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        server.accept_pending();

        vehicle.step(cycle_start.duration_since(last_step).as_secs_f64());
        last_step = cycle_start;

        let msg = vehicle.message(unix_now());
        match encode_message(&msg) {
            Ok(line) => {
                let receivers = server.send_all(&line);
                if receivers > 0 {
                    sent_lines += 1;
                }
                debug!(
                    "→ {} cliente(s) | {:.1} mph | pos ({:.1}, {:.1})",
                    receivers,
                    msg.speed_mph(),
                    msg.pos_x,
                    msg.pos_z
                );
            }
            Err(e) => error!("Erro ao serializar telemetria: {e}"),
        }

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    info!(
        "Encerrando após {sent_lines} envios ({} cliente(s) conectados)",
        server.client_count()
    );
    Ok(())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
