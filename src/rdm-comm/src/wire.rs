// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire contract between operation phases and protocol drivers.
//!
//! Phases speak in abstract requests; a per-protocol codec turns them
//! into frames and interprets the response bytes. The engine never sees
//! protocol byte layouts.

use rdm_core::DeviceResult;

/// Abstract request one phase sends to a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireRequest {
    /// Read `len` bytes of controller memory at `address`.
    ReadMemory { address: u16, len: usize },
    /// Write bytes into controller memory at `address`.
    WriteMemory { address: u16, data: Vec<u8> },
    /// Restart the controller firmware at the given level.
    Restart { level: u8 },
    /// Synchronize the controller clock to a minute of day.
    SyncClock { minute_of_day: u16 },
    /// Actuate a command code on an I/O pin.
    DeviceCommand { pin: u8, code: u8 },
    /// Query the reported status code of an I/O pin.
    QueryDevice { pin: u8 },
}

/// Decoded controller response for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireResponse {
    Ack,
    Data(Vec<u8>),
    DeviceStatus { pin: u8, code: u8 },
}

/// Per-protocol encoder/decoder injected into a comm task.
pub trait WireCodec: Send {
    /// Build the request frame for a controller drop address.
    fn encode_request(&mut self, drop_addr: u8, req: &WireRequest) -> DeviceResult<Vec<u8>>;

    /// Expected response frame length for the request, so the link can
    /// perform a bounded read.
    fn response_len(&self, req: &WireRequest) -> usize;

    /// Interpret a raw response frame. Framing faults surface as
    /// malformed-response errors and are retried by the engine.
    fn decode_response(&mut self, req: &WireRequest, raw: &[u8]) -> DeviceResult<WireResponse>;
}
