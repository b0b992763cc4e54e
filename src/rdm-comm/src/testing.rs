// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bench doubles for engine and driver tests: a scripted link and a
//! minimal flat-frame codec. No hardware or socket required.

use std::collections::VecDeque;
use std::time::Duration;

use rdm_core::{DeviceError, DeviceResult};

use crate::link::{CommLink, LinkFuture};
use crate::wire::{WireCodec, WireRequest, WireResponse};

/// Link that records sent frames and replays scripted responses.
#[derive(Default)]
pub struct ScriptedLink {
    pub sent: Vec<Vec<u8>>,
    responses: VecDeque<DeviceResult<Vec<u8>>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next response frame (or link fault).
    pub fn push_response(&mut self, response: DeviceResult<Vec<u8>>) {
        self.responses.push_back(response);
    }

    /// Script a plain acknowledge frame.
    pub fn push_ack(&mut self) {
        self.responses.push_back(Ok(vec![0]));
    }
}

impl CommLink for ScriptedLink {
    fn send<'a>(&'a mut self, frame: &'a [u8]) -> LinkFuture<'a, ()> {
        self.sent.push(frame.to_vec());
        Box::pin(async { Ok(()) })
    }

    fn recv_exact<'a>(&'a mut self, _len: usize, _window: Duration) -> LinkFuture<'a, Vec<u8>> {
        let next = self
            .responses
            .pop_front()
            .unwrap_or(Err(DeviceError::Timeout));
        Box::pin(async move { next })
    }
}

/// Codec with a trivial one-byte-tag framing, for exercising the engine
/// without a real protocol.
#[derive(Default)]
pub struct FlatCodec;

impl WireCodec for FlatCodec {
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
