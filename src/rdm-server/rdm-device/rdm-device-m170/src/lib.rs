// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Driver for 170-style ramp meter cabinets.
//!
//! Implements the addressed memory-exchange framing these controllers
//! speak and the multi-phase configuration download that programs them.

pub mod download;
pub mod timing;

use rdm_comm::{WireCodec, WireRequest, WireResponse};
use rdm_core::{DeviceError, DeviceResult};

pub use download::{ConfigDownload, DownloadConfig, MeterSlot};
pub use timing::{merge_plans, pack_table, MeterTimes, TimingTable};

/// Controller memory map.
pub mod addr {
    /// Cabinet type dip switch reading.
    pub const CABINET_TYPE: u16 = 0x0151;
    /// Firmware version, two bytes (major, minor).
    pub const PROM_VERSION: u16 = 0x0100;
    /// Comm fail threshold, tenths of a second.
    pub const COMM_FAIL: u16 = 0x0115;
    /// Special function output base.
    pub const SPECIAL_FUNCTION_OUTPUTS: u16 = 0x0120;
    /// Queue detector input bitmap.
    pub const QUEUE_BITMAP: u16 = 0x0130;
    pub const METER_1_TIMING_TABLE: u16 = 0x0180;
    pub const METER_2_TIMING_TABLE: u16 = 0x0200;
    pub const RAMP_METER_DATA: u16 = 0x0300;
    /// Police panel flag offset within ramp meter data.
    pub const OFF_POLICE_PANEL: u16 = 0x08;
    /// Second meter offset within ramp meter data.
    pub const OFF_METER_2: u16 = 0x40;

    pub const DETECTOR_RESET: u8 = 0x02;
    pub const WATCHDOG_RESET: u8 = 0x01;

    /// Detector inputs available on one cabinet.
    pub const DETECTOR_INPUTS: usize = 24;
}

/// Request categories on the wire.
mod cat {
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const RESTART: u8 = 0x03;
    pub const SYNC_CLOCK: u8 = 0x04;
    pub const DEVICE_COMMAND: u8 = 0x05;
    pub const DEVICE_QUERY: u8 = 0x06;
}

/// Response status codes.
mod stat {
    pub const OK: u8 = 0x00;
    /// Request category not supported by this firmware.
    pub const UNSUPPORTED: u8 = 0x15;
}

/// Two's complement of the byte sum; a frame's bytes including the
/// checksum sum to zero.
fn checksum(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// Codec for the 170-style addressed memory-exchange framing.
///
/// Request frame: drop, category, payload length, payload, checksum.
/// Response frame: drop, status, payload length, payload, checksum.
pub struct M170Codec {
    last_drop: u8,
}

impl M170Codec {
    pub fn new() -> Self {
        Self { last_drop: 0 }
    }

    fn frame(&self, drop_addr: u8, category: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.push(drop_addr);
        frame.push(category);
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);
        frame.push(checksum(&frame));
        frame
    }
}

impl Default for M170Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl WireCodec for M170Codec {
    fn encode_request(&mut self, drop_addr: u8, req: &WireRequest) -> DeviceResult<Vec<u8>> {
        self.last_drop = drop_addr;
        let frame = match req {
            WireRequest::ReadMemory { address, len } => {
                if *len > 0xFF {
                    return Err(DeviceError::Config(format!("read of {} bytes", len)));
                }
                self.frame(
                    drop_addr,
                    cat::READ,
                    &[(*address >> 8) as u8, *address as u8, *len as u8],
                )
            }
            WireRequest::WriteMemory { address, data } => {
                let mut payload = vec![(*address >> 8) as u8, *address as u8];
                payload.extend_from_slice(data);
                self.frame(drop_addr, cat::WRITE, &payload)
            }
            WireRequest::Restart { level } => self.frame(drop_addr, cat::RESTART, &[*level]),
            WireRequest::SyncClock { minute_of_day } => self.frame(
                drop_addr,
                cat::SYNC_CLOCK,
                &[(*minute_of_day >> 8) as u8, *minute_of_day as u8],
            ),
            WireRequest::DeviceCommand { pin, code } => {
                self.frame(drop_addr, cat::DEVICE_COMMAND, &[*pin, *code])
            }
            WireRequest::QueryDevice { pin } => self.frame(drop_addr, cat::DEVICE_QUERY, &[*pin]),
        };
        Ok(frame)
    }

    fn response_len(&self, req: &WireRequest) -> usize {
        // drop + status + length + payload + checksum
        4 + match req {
            WireRequest::ReadMemory { len, .. } => *len,
            WireRequest::QueryDevice { .. } => 1,
            _ => 0,
        }
    }

    fn decode_response(&mut self, req: &WireRequest, raw: &[u8]) -> DeviceResult<WireResponse> {
        if raw.len() < 4 {
            return Err(DeviceError::Malformed(format!(
                "response frame of {} bytes",
                raw.len()
            )));
        }
        if checksum(&raw[..raw.len() - 1]) != raw[raw.len() - 1] {
            return Err(DeviceError::Malformed("checksum mismatch".into()));
        }
        if raw[0] != self.last_drop {
            return Err(DeviceError::Malformed(format!(
                "drop address {} in response to {}",
                raw[0], self.last_drop
            )));
        }
        match raw[1] {
            stat::OK => {}
            stat::UNSUPPORTED => {
                return Err(DeviceError::Expected("request not supported".into()))
            }
            code => return Err(DeviceError::Status(format!("controller status {}", code))),
        }
        let payload_len = usize::from(raw[2]);
        let payload = &raw[3..raw.len() - 1];
        if payload.len() != payload_len {
            return Err(DeviceError::Malformed("payload length mismatch".into()));
        }
        match req {
            WireRequest::ReadMemory { len, .. } => {
                if payload.len() != *len {
                    return Err(DeviceError::Malformed(format!(
                        "read returned {} of {} bytes",
                        payload.len(),
                        len
                    )));
                }
                Ok(WireResponse::Data(payload.to_vec()))
            }
            WireRequest::QueryDevice { pin } => {
                let Some(code) = payload.first() else {
                    return Err(DeviceError::Malformed("empty status payload".into()));
                };
                Ok(WireResponse::DeviceStatus {
                    pin: *pin,
                    code: *code,
                })
            }
            _ => Ok(WireResponse::Ack),
        }
    }
}

/// Build a valid response frame; shared with driver tests.
pub fn response_frame(drop_addr: u8, status: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(drop_addr);
    frame.push(status);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    frame
}
