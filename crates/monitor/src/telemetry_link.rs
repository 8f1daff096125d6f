//! Thread de telemetria: conecta via TCP, lê linhas JSON e publica no
//! [`VehicleStateCell`].
//!
//! Nunca desiste: perda de conexão, timeout ou EOF marcam `connected=false`
//! e uma nova tentativa é feita após `retry_delay` (com backoff até o teto
//! configurado). O sinal de parada é checado entre tentativas e a cada poll
//! de leitura.

use speedsign_core::config::LinkConfig;
use speedsign_core::protocol::{decode_message, MAX_LINE_BYTES};
use speedsign_core::state::VehicleStateCell;
use speedsign_core::types::VehicleState;
use std::io::{BufRead, BufReader, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Granularidade das esperas interrompíveis.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Sinal de parada que pode ser clonado para outras threads.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Dorme até `duration` ou até a parada. Retorna `false` se parou.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}

/// Link de telemetria em background.
pub struct TelemetryLink {
    state: Arc<VehicleStateCell>,
    stop: StopHandle,
    handle: Option<JoinHandle<()>>,
}

impl TelemetryLink {
    /// Inicia a thread de conexão. Não bloqueia esperando a fonte.
    pub fn start(config: &LinkConfig, state: Arc<VehicleStateCell>) -> std::io::Result<Self> {
        let stop = StopHandle::default();
        let settings = config.clone();
        let thread_state = Arc::clone(&state);
        let thread_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name("telemetry-link".into())
            .spawn(move || {
                link_loop(&settings, &thread_state, &thread_stop);
            })?;

        Ok(Self {
            state,
            stop,
            handle: Some(handle),
        })
    }

    /// Último estado conhecido; nunca espera a thread de rede.
    pub fn current_state(&self) -> VehicleState {
        self.state.snapshot(Instant::now())
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Sinaliza a parada e aguarda a thread liberar a conexão.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Thread de telemetria terminou com pânico");
            }
            info!("Link de telemetria encerrado");
        }
    }
}

impl Drop for TelemetryLink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Por que uma sessão conectada terminou.
#[derive(Debug)]
enum SessionEnd {
    Stopped,
    Closed,
    Stalled(Duration),
    Failed(std::io::Error),
}

fn link_loop(config: &LinkConfig, state: &VehicleStateCell, stop: &StopHandle) {
    let target = format!("{}:{}", config.host, config.port);
    let mut delay = config.retry_delay();
    let mut failures: u64 = 0;

    info!("Link de telemetria → {target}");

    while !stop.is_stopped() {
        match connect(config) {
            Ok((stream, addr)) => {
                info!("✓ Conectado à telemetria em {addr}");
                failures = 0;
                delay = config.retry_delay();

                let end = read_session(stream, config, state, stop);
                state.mark_disconnected();
                match end {
                    SessionEnd::Stopped => break,
                    SessionEnd::Closed => warn!("Telemetria fechou a conexão – usando fallback"),
                    SessionEnd::Stalled(idle) => warn!(
                        "Telemetria sem dados há {:.1}s – reconectando",
                        idle.as_secs_f64()
                    ),
                    SessionEnd::Failed(e) => warn!("Erro lendo telemetria: {e} – reconectando"),
                }
            }
            Err(e) => {
                state.mark_disconnected();
                failures += 1;
                // Fonte pode subir bem depois do monitor: loga só de vez em quando
                if failures == 1 || failures % 30 == 0 {
                    warn!(
                        "Telemetria inacessível em {target} ({e}). Tentando novamente a cada {:.1}s (velocidade de fallback)",
                        delay.as_secs_f64()
                    );
                } else {
                    debug!("Tentativa {failures} de conexão falhou: {e}");
                }
            }
        }

        if !stop.sleep(delay) {
            break;
        }
        delay = (delay * 2).min(config.retry_backoff_max());
    }

    state.mark_disconnected();
    debug!("Loop de telemetria finalizado");
}

fn connect(config: &LinkConfig) -> std::io::Result<(TcpStream, SocketAddr)> {
    let mut last_err = None;
    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout()) {
            Ok(stream) => return Ok((stream, addr)),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(ErrorKind::AddrNotAvailable, "host sem endereços")
    }))
}

fn read_session(
    stream: TcpStream,
    config: &LinkConfig,
    state: &VehicleStateCell,
    stop: &StopHandle,
) -> SessionEnd {
    if let Err(e) = stream.set_read_timeout(Some(config.read_poll())) {
        return SessionEnd::Failed(e);
    }
    stream.set_nodelay(true).ok();

    let stale_timeout = config.stale_timeout();
    let mut reader = BufReader::new(stream);
    let mut line = Vec::with_capacity(256);
    let mut last_message = Instant::now();

    loop {
        if stop.is_stopped() {
            return SessionEnd::Stopped;
        }

        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return SessionEnd::Closed,
            Ok(_) => {
                if line.last() != Some(&b'\n') {
                    // EOF no meio de uma linha; a próxima leitura retorna 0
                    continue;
                }
                match decode_message(&line) {
                    Ok(msg) => {
                        let now = Instant::now();
                        last_message = now;
                        if !state.publish(&msg, now) {
                            debug!("Override manual ativo, telemetria ignorada");
                        }
                    }
                    Err(e) => debug!("Mensagem de telemetria descartada: {e}"),
                }
                line.clear();
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                // Timeout normal do poll; bytes parciais continuam em `line`
                if line.len() > MAX_LINE_BYTES {
                    debug!("Linha de {} bytes sem delimitador, descartando", line.len());
                    line.clear();
                }
                let idle = last_message.elapsed();
                if idle >= stale_timeout {
                    return SessionEnd::Stalled(idle);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return SessionEnd::Failed(e),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use speedsign_core::types::SpeedSource;
    use std::io::Write;
    use std::net::TcpListener;

    fn test_config(port: u16) -> LinkConfig {
        LinkConfig {
            host: "127.0.0.1".into(),
            port,
            connect_timeout_secs: 0.5,
            read_poll_secs: 0.05,
            stale_timeout_secs: 0.5,
            retry_delay_secs: 0.05,
            retry_backoff_max_secs: 0.05,
            fallback_speed_mph: 30.0,
        }
    }

    fn cell(config: &LinkConfig) -> Arc<VehicleStateCell> {
        Arc::new(VehicleStateCell::new(
            config.stale_timeout(),
            config.fallback_speed_mph,
        ))
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn publishes_messages_and_drops_malformed_ones() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = test_config(listener.local_addr().unwrap().port());
        let state = cell(&config);
        let mut link = TelemetryLink::start(&config, Arc::clone(&state)).unwrap();

        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(b"isto nao e json\n").unwrap();
        conn.write_all(b"{\"speed_mps\": 12.5, \"pos_x\": 1.0}\n").unwrap();
        conn.write_all(b"{\"speed_mps\": 12.5, \"speed_mph\": 28.0, \"pos_x\": 3.0, \"pos_z\": 4.0}\n")
            .unwrap();

        assert!(wait_until(Duration::from_secs(2), || link.current_state().connected));
        let s = link.current_state();
        assert_eq!(s.source, SpeedSource::Telemetry);
        assert_eq!(s.speed_mps, 12.5);
        assert_eq!((s.position_x, s.position_z), (3.0, 4.0));

        // Mensagem chegando em pedaços
        conn.write_all(b"{\"speed_mps\": 20.0, ").unwrap();
        conn.flush().unwrap();
        std::thread::sleep(Duration::from_millis(120));
        conn.write_all(b"\"pos_x\": 5.0, \"pos_z\": 6.0}\n").unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            link.current_state().speed_mps == 20.0
        }));

        link.stop();
    }

    #[test]
    fn reconnects_after_connection_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = test_config(listener.local_addr().unwrap().port());
        let state = cell(&config);
        let mut link = TelemetryLink::start(&config, Arc::clone(&state)).unwrap();

        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(b"{\"speed_mps\": 10.0, \"pos_x\": 0, \"pos_z\": 0}\n").unwrap();
        assert!(wait_until(Duration::from_secs(2), || link.current_state().connected));

        drop(conn);
        assert!(wait_until(Duration::from_secs(2), || !link.current_state().connected));
        let s = link.current_state();
        assert_eq!(s.source, SpeedSource::Fallback);
        assert!((s.speed_mph() - 30.0).abs() < 1e-9);

        // O link volta sozinho
        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(b"{\"speed_mps\": 15.0, \"pos_x\": 0, \"pos_z\": 0}\n").unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            let s = link.current_state();
            s.connected && s.speed_mps == 15.0
        }));

        link.stop();
    }

    #[test]
    fn silent_source_becomes_disconnected_within_stale_window() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = test_config(listener.local_addr().unwrap().port());
        let state = cell(&config);
        let mut link = TelemetryLink::start(&config, Arc::clone(&state)).unwrap();

        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(b"{\"speed_mps\": 10.0, \"pos_x\": 0, \"pos_z\": 0}\n").unwrap();
        assert!(wait_until(Duration::from_secs(2), || link.current_state().connected));

        // Conexão aberta, mas sem dados
        let started = Instant::now();
        assert!(wait_until(Duration::from_secs(2), || !link.current_state().connected));
        assert!(started.elapsed() < Duration::from_secs(1));

        link.stop();
        drop(conn);
    }

    #[test]
    fn stop_is_prompt_while_source_is_down() {
        // Porta livre: bind e drop imediato
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = test_config(port);
        let state = cell(&config);
        let mut link = TelemetryLink::start(&config, Arc::clone(&state)).unwrap();

        std::thread::sleep(Duration::from_millis(200));
        assert!(!link.current_state().connected);

        let stopper = link.stop_handle();
        let started = Instant::now();
        std::thread::spawn(move || stopper.stop()).join().unwrap();
        link.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stop_handle_sleep_is_interruptible() {
        let stop = StopHandle::default();
        assert!(stop.sleep(Duration::from_millis(10)));
        stop.stop();
        let started = Instant::now();
        assert!(!stop.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
