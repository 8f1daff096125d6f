//! Servidor TCP de telemetria: aceita clientes e envia a mesma linha a todos.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tempo máximo de escrita por cliente; um cliente lento é descartado.
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

pub struct Broadcaster {
    listener: TcpListener,
    clients: Vec<(SocketAddr, TcpStream)>,
}

impl Broadcaster {
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            clients: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Aceita todas as conexões pendentes sem bloquear.
    pub fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = configure(&stream) {
                        warn!("Cliente {peer} rejeitado: {e}");
                        continue;
                    }
                    info!("Cliente conectado: {peer}");
                    self.clients.push((peer, stream));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Erro no accept: {e}");
                    break;
                }
            }
        }
    }

    /// Envia `line` a todos os clientes; remove os que falharem.
    /// Retorna quantos receberam.
    pub fn send_all(&mut self, line: &[u8]) -> usize {
        self.clients.retain_mut(|(peer, stream)| match stream.write_all(line) {
            Ok(()) => true,
            Err(e) => {
                info!("Cliente desconectado: {peer}");
                debug!("Motivo: {e}");
                false
            }
        });
        self.clients.len()
    }
}

fn configure(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}
