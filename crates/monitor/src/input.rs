//! Thread que lê comandos do operador do stdin.
//!
//! Cada caractere reconhecido de uma linha vira um comando (`m`, `t`, `w`,
//! `s`, `0`–`9`, `q`). A thread é destacada: fica bloqueada no stdin e morre
//! com o processo.

use crossbeam_channel::{Receiver, Sender, unbounded};
use speedsign_core::operator::OperatorCommand;
use std::io::BufRead;
use tracing::debug;

/// Decodifica uma linha digitada em comandos.
pub fn parse_line(line: &str, step_mph: f64) -> Vec<OperatorCommand> {
    line.chars()
        .filter(|c| !c.is_whitespace())
        .filter_map(|c| OperatorCommand::from_key(c, step_mph))
        .collect()
}

/// Inicia a leitura do stdin. Retorna o receiver dos comandos.
pub fn spawn_stdin_reader(step_mph: f64) -> std::io::Result<Receiver<OperatorCommand>> {
    let (tx, rx) = unbounded::<OperatorCommand>();

    std::thread::Builder::new()
        .name("operator-input".into())
        .spawn(move || read_commands(std::io::stdin().lock(), &tx, step_mph))?;

    Ok(rx)
}

fn read_commands<R: BufRead>(reader: R, tx: &Sender<OperatorCommand>, step_mph: f64) {
    for line in reader.lines() {
        let Ok(line) = line else { break };
        for cmd in parse_line(&line, step_mph) {
            if tx.send(cmd).is_err() {
                return;
            }
        }
    }
    debug!("stdin encerrado, sem mais comandos do operador");
}
