// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Duplex byte links to field controllers.
//!
//! A link owns raw byte I/O only; framing belongs to the wire codec.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use rdm_core::{DeviceError, DeviceResult};

pub type LinkFuture<'a, T> = Pin<Box<dyn Future<Output = DeviceResult<T>> + Send + 'a>>;

/// One duplex channel to a field controller.
pub trait CommLink: Send {
    /// Transmit one request frame.
    fn send<'a>(&'a mut self, frame: &'a [u8]) -> LinkFuture<'a, ()>;

    /// Receive exactly `len` response bytes within `window`. Nothing
    /// arriving is a timeout; a partial frame is a short response.
    fn recv_exact<'a>(&'a mut self, len: usize, window: Duration) -> LinkFuture<'a, Vec<u8>>;
}

/// TCP link to a controller drop reachable over an IP network.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    pub async fn connect(addr: &str) -> DeviceResult<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| DeviceError::ConnectionLost(format!("{}: {}", addr, e)))?;
        Ok(Self { stream })
    }

    /// Connect from synchronous setup code. Must be called within a
    /// tokio runtime.
    pub fn connect_std(addr: &str) -> DeviceResult<Self> {
        let std_stream = std::net::TcpStream::connect(addr)
            .map_err(|e| DeviceError::ConnectionLost(format!("{}: {}", addr, e)))?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| DeviceError::ConnectionLost(e.to_string()))?;
        let stream = TcpStream::from_std(std_stream)
            .map_err(|e| DeviceError::ConnectionLost(e.to_string()))?;
        Ok(Self { stream })
    }
}

impl CommLink for TcpLink {
    fn send<'a>(&'a mut self, frame: &'a [u8]) -> LinkFuture<'a, ()> {
        Box::pin(async move {
            self.stream
                .write_all(frame)
                .await
                .map_err(|e| DeviceError::ConnectionLost(e.to_string()))?;
            self.stream
                .flush()
                .await
                .map_err(|e| DeviceError::ConnectionLost(e.to_string()))
        })
    }

    fn recv_exact<'a>(&'a mut self, len: usize, window: Duration) -> LinkFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let mut buf = vec![0u8; len];
            match timeout(window, self.stream.read_exact(&mut buf)).await {
                Err(_) => Err(DeviceError::Timeout),
                Ok(Err(e)) => Err(DeviceError::ConnectionLost(e.to_string())),
                Ok(Ok(_)) => Ok(buf),
            }
        })
    }
}

/// Serial link to a directly wired controller drop.
pub struct SerialLink {
    port: SerialStream,
}

impl SerialLink {
    pub fn open(path: &str, baud: u32) -> DeviceResult<Self> {
        let port = tokio_serial::new(path, baud)
            .open_native_async()
            .map_err(|e| DeviceError::ConnectionLost(format!("{}: {}", path, e)))?;
        Ok(Self { port })
    }
}

impl CommLink for SerialLink {
    fn send<'a>(&'a mut self, frame: &'a [u8]) -> LinkFuture<'a, ()> {
        Box::pin(async move {
            // Stale bytes from an aborted exchange would corrupt the
            // next response frame.
            let _ = self.port.clear(ClearBuffer::Input);
            self.port
                .write_all(frame)
                .await
                .map_err(|e| DeviceError::ConnectionLost(e.to_string()))
        })
    }

    fn recv_exact<'a>(&'a mut self, len: usize, window: Duration) -> LinkFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let mut buf = vec![0u8; len];
            let mut read = 0usize;
            let deadline = Instant::now() + window;
            while read < len {
                let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                    return Err(short_response(read, len));
                };
                match timeout(remaining, self.port.read(&mut buf[read..])).await {
                    Err(_) => return Err(short_response(read, len)),
                    Ok(Ok(0)) => {
                        return Err(DeviceError::ConnectionLost("serial port closed".into()))
                    }
                    Ok(Ok(n)) => read += n,
                    Ok(Err(e)) => return Err(DeviceError::ConnectionLost(e.to_string())),
                }
            }
            Ok(buf)
        })
    }
}

fn short_response(read: usize, len: usize) -> DeviceError {
    if read == 0 {
        DeviceError::Timeout
    } else {
        DeviceError::Malformed(format!("short response: {} of {} bytes", read, len))
    }
}
