// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dummy device driver for development and testing.
//!
//! Simulates a field controller in memory and responds to all requests
//! immediately. No hardware or serial port required. Commanded gate pins
//! move through their transitional state and settle on the next query.

use std::collections::HashMap;
use std::time::Duration;

use rdm_comm::{CommLink, LinkFuture, WireCodec, WireRequest, WireResponse};
use rdm_core::{DeviceError, DeviceResult, GateArmState};

const MEMORY_SIZE: usize = 256;

/// In-memory controller simulation behind a flat one-byte-tag framing.
pub struct DummyLink {
    memory: [u8; MEMORY_SIZE],
    pins: HashMap<u8, GateArmState>,
    response: Option<Vec<u8>>,
}

impl DummyLink {
    pub fn new() -> Self {
        Self {
            memory: [0; MEMORY_SIZE],
            pins: HashMap::new(),
            response: None,
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Vec<u8> {
        // frame[0] is the drop address; frame[1] the request tag.
        if frame.len() < 2 {
            return vec![0xFF];
        }
        match frame[1] {
            1 => {
                // Read memory: [hi, lo, len]
                let addr = usize::from(frame[2]) << 8 | usize::from(frame[3]);
                let len = usize::from(frame[4]);
                let end = (addr + len).min(MEMORY_SIZE);
                self.memory[addr.min(MEMORY_SIZE)..end].to_vec()
            }
            2 => {
                // Write memory: [hi, lo, data...]
                let addr = usize::from(frame[2]) << 8 | usize::from(frame[3]);
                for (i, b) in frame[4..].iter().enumerate() {
                    if addr + i < MEMORY_SIZE {
                        self.memory[addr + i] = *b;
                    }
                }
                vec![0]
            }
            3 | 4 => vec![0],
            5 => {
                // Device command: the pin enters the commanded state.
                // Codes above the state range carry interlock settings,
                // which the simulated cabinet simply acknowledges.
                let pin = frame[2];
                let code = frame[3];
                if code & 0x10 != 0 {
                    vec![0]
                } else if let Some(state) = GateArmState::from_code(code) {
                    self.pins.insert(pin, state);
                    vec![0]
                } else {
                    vec![0xFF]
                }
            }
            6 => {
                // Device query: report, then settle transitional states.
                let pin = frame[2];
                let state = *self.pins.entry(pin).or_insert(GateArmState::Closed);
                let settled = match state {
                    GateArmState::Opening => GateArmState::Open,
                    GateArmState::Closing => GateArmState::Closed,
                    other => other,
                };
                self.pins.insert(pin, settled);
                vec![state.code()]
            }
            _ => vec![0xFF],
        }
    }
}

impl Default for DummyLink {
    fn default() -> Self {
        Self::new()
    }
}

impl CommLink for DummyLink {
    fn send<'a>(&'a mut self, frame: &'a [u8]) -> LinkFuture<'a, ()> {
        self.response = Some(self.handle_frame(frame));
        Box::pin(async { Ok(()) })
    }

    fn recv_exact<'a>(&'a mut self, _len: usize, _window: Duration) -> LinkFuture<'a, Vec<u8>> {
        let response = self.response.take().ok_or(DeviceError::Timeout);
        Box::pin(async move { response })
    }
}

/// Flat one-byte-tag codec matching [`DummyLink`] framing.
pub struct DummyCodec;

impl WireCodec for DummyCodec {
    fn encode_request(&mut self, drop_addr: u8, req: &WireRequest) -> DeviceResult<Vec<u8>> {
        let mut frame = vec![drop_addr];
        match req {
            WireRequest::ReadMemory { address, len } => {
                frame.extend_from_slice(&[1, (*address >> 8) as u8, *address as u8, *len as u8]);
            }
            WireRequest::WriteMemory { address, data } => {
                frame.extend_from_slice(&[2, (*address >> 8) as u8, *address as u8]);
                frame.extend_from_slice(data);
            }
            WireRequest::Restart { level } => frame.extend_from_slice(&[3, *level]),
            WireRequest::SyncClock { minute_of_day } => {
                frame.extend_from_slice(&[4, (*minute_of_day >> 8) as u8, *minute_of_day as u8]);
            }
            WireRequest::DeviceCommand { pin, code } => frame.extend_from_slice(&[5, *pin, *code]),
            WireRequest::QueryDevice { pin } => frame.extend_from_slice(&[6, *pin]),
        }
        Ok(frame)
    }

    fn response_len(&self, req: &WireRequest) -> usize {
        match req {
            WireRequest::ReadMemory { len, .. } => *len,
            _ => 1,
        }
    }

    fn decode_response(&mut self, req: &WireRequest, raw: &[u8]) -> DeviceResult<WireResponse> {
        if raw.is_empty() {
            return Err(DeviceError::Malformed("empty response".into()));
        }
        match req {
            WireRequest::ReadMemory { .. } => Ok(WireResponse::Data(raw.to_vec())),
            WireRequest::QueryDevice { pin } => Ok(WireResponse::DeviceStatus {
                pin: *pin,
                code: raw[0],
            }),
            _ => {
                if raw[0] == 0 {
                    Ok(WireResponse::Ack)
                } else {
                    Err(DeviceError::Status(format!("status code {}", raw[0])))
                }
            }
        }
    }
}
