pub(crate) use client::{ClientReader, ClientWriter};
use tokio::{io, time};

use super::packet;

mod client;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("First packet not connect")]
    FirstPacketNotConnect,
    #[error("Connect packet not received in time")]
    ConnectTimeout,
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("I/O: {0}")]
    IO(#[from] io::Error),
    #[error("Keep alive timeout")]
    KeepAlive(#[from] time::error::Elapsed),
    #[error("Connection closed by peer")]
    ConnectionAborted,
    #[error("Connection reset by peer")]
    ConnectionReset,
}
