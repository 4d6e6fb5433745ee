//! HiQSDR "St" status frame encoding and decoding.
//!
//! The host sends the complete wanted state in every frame; the FPGA echoes
//! what it accepted. All multi-byte fields are little-endian.
//!
//! ```text
//! offset size field
//!  0     2    "St"
//!  2     4    receive tune phase
//!  6     4    transmit tune phase (VNA: phase step per point)
//! 10     1    transmit level
//! 11     1    transmit control, see `tx_control`
//! 12     1    receive control: stage-2 decimation - 1, prescaler in bits 6-7
//! 13     1    firmware version (echo only; 0 from the host while unknown)
//! 14     1    X1 connector: preselector nibble, preamp, full duplex
//! 15     1    attenuator
//! 16     1    extra IO: antenna switch
//! 17     1    sidetone volume
//! 18     2    VNA point count, 0 for normal operation
//! 20     1    CW delay
//! 21     1    predistortion control
//! 22     2    noise blanker level
//! ```
//!
//! Until the firmware version is known the host sends only the 14-byte
//! core. Shorter echoes from old firmware decode with the missing fields
//! zero-filled. What each firmware level understands is captured by
//! [`FeatureLevel`].

use bytes::{Buf, BufMut, BytesMut};
use sdrlink_core::sync::FrameCodec;

pub const STATUS_MAGIC: &[u8; 2] = b"St";
/// Status query for external tools. The reply is a status frame starting
/// with "Qs" instead of "St".
pub const QUERY_MAGIC: &[u8; 2] = b"Qs";

/// Length of the frame understood by every firmware.
pub const CORE_LEN: usize = 14;
/// Length of the frame once the firmware version is known.
pub const FULL_LEN: usize = 24;

/// Bits of the transmit control byte.
pub mod tx_control {
    pub const CW: u8 = 0x01;
    pub const OTHER_MODES: u8 = 0x02;
    pub const EXTENDED_IO: u8 = 0x04;
    /// Software key.
    pub const KEY: u8 = 0x08;
    pub const TX_RATE_MASK: u8 = 0x30;
    pub const SPOT: u8 = 0x40;
    pub const MIC_BOOST: u8 = 0x80;
    pub const MODE_MASK: u8 = CW | OTHER_MODES;
}

/// Bits of the receive control byte.
pub mod rx_control {
    pub const DECIMATION_MASK: u8 = 0x3F;
    /// Prescaler 2 with 2-byte samples instead of prescaler 8.
    pub const PRESCALER_2: u8 = 0x40;
}

/// Bits of the X1 connector byte.
pub mod connector {
    pub const BAND_MASK: u8 = 0x0F;
    pub const PREAMP: u8 = 0x10;
    pub const FULL_DUPLEX: u8 = 0x20;
}

pub const ANTENNA_2: u8 = 0x01;
pub const PREDISTORTION: u8 = 0x01;

/// One status frame, as wanted by the host or echoed by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFrame {
    pub rx_phase: u32,
    pub tx_phase: u32,
    pub tx_level: u8,
    pub tx_control: u8,
    pub rx_control: u8,
    pub firmware: u8,
    pub connector_x1: u8,
    pub attenuator: u8,
    pub io_bits: u8,
    pub sidetone: u8,
    pub vna_count: u16,
    pub cw_delay: u8,
    pub predistortion: u8,
    pub noise_blanker: u16,
}

/// Fields a firmware version understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FeatureLevel {
    /// Version 0 (1.0): the 14-byte core only.
    Core,
    /// 1.1 and 1.2: X1 connector, attenuator and antenna bytes.
    ExtendedIo,
    /// 1.3: sidetone, VNA count, CW delay, predistortion.
    Vna,
    /// 1.4 and later: noise blanker.
    NoiseBlanker,
}

impl FeatureLevel {
    pub fn for_firmware(version: u8) -> Self {
        match version {
            0 => FeatureLevel::Core,
            1 | 2 => FeatureLevel::ExtendedIo,
            3 => FeatureLevel::Vna,
            _ => FeatureLevel::NoiseBlanker,
        }
    }
}

impl StatusFrame {
    /// This frame with every field `firmware` does not understand zeroed.
    ///
    /// The extended IO bytes additionally need the extended-IO bit in the
    /// transmit control byte.
    pub fn masked_for(&self, firmware: Option<u8>) -> StatusFrame {
        let Some(version) = firmware else {
            return StatusFrame {
                rx_phase: self.rx_phase,
                tx_phase: self.tx_phase,
                tx_level: self.tx_level,
                tx_control: self.tx_control,
                rx_control: self.rx_control,
                ..StatusFrame::default()
            };
        };
        let level = FeatureLevel::for_firmware(version);
        let mut frame = *self;
        frame.firmware = version;
        if level < FeatureLevel::ExtendedIo || self.tx_control & tx_control::EXTENDED_IO == 0 {
            frame.connector_x1 = 0;
            frame.attenuator = 0;
            frame.io_bits = 0;
        }
        if level < FeatureLevel::Vna {
            frame.sidetone = 0;
            frame.vna_count = 0;
            frame.cw_delay = 0;
            frame.predistortion = 0;
        }
        if level < FeatureLevel::NoiseBlanker {
            frame.noise_blanker = 0;
        }
        frame
    }

    /// Key up, transmitter disabled, no sweep. Sent on close.
    pub fn safe(&self) -> StatusFrame {
        StatusFrame {
            tx_control: self.tx_control & !(tx_control::KEY | tx_control::MODE_MASK),
            tx_level: 0,
            vna_count: 0,
            ..*self
        }
    }

    pub fn wire_len(&self) -> usize {
        if self.firmware == 0 { CORE_LEN } else { FULL_LEN }
    }
}

/// Encode a frame: 14 bytes while the firmware byte is 0, else 24.
pub fn encode(frame: &StatusFrame) -> Vec<u8> {
    encode_with_magic(frame, STATUS_MAGIC)
}

fn encode_with_magic(frame: &StatusFrame, magic: &[u8; 2]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(FULL_LEN);
    buf.put_slice(magic);
    buf.put_u32_le(frame.rx_phase);
    buf.put_u32_le(frame.tx_phase);
    buf.put_u8(frame.tx_level);
    buf.put_u8(frame.tx_control);
    buf.put_u8(frame.rx_control);
    buf.put_u8(frame.firmware);
    if frame.wire_len() == FULL_LEN {
        buf.put_u8(frame.connector_x1);
        buf.put_u8(frame.attenuator);
        buf.put_u8(frame.io_bits);
        buf.put_u8(frame.sidetone);
        buf.put_u16_le(frame.vna_count);
        buf.put_u8(frame.cw_delay);
        buf.put_u8(frame.predistortion);
        buf.put_u16_le(frame.noise_blanker);
    }
    buf.to_vec()
}

fn decode_body(mut buf: &[u8]) -> StatusFrame {
    StatusFrame {
        rx_phase: buf.get_u32_le(),
        tx_phase: buf.get_u32_le(),
        tx_level: buf.get_u8(),
        tx_control: buf.get_u8(),
        rx_control: buf.get_u8(),
        firmware: buf.get_u8(),
        connector_x1: buf.get_u8(),
        attenuator: buf.get_u8(),
        io_bits: buf.get_u8(),
        sidetone: buf.get_u8(),
        vna_count: buf.get_u16_le(),
        cw_delay: buf.get_u8(),
        predistortion: buf.get_u8(),
        noise_blanker: buf.get_u16_le(),
    }
}

fn decode_with_magic(buf: &[u8], magic: &[u8; 2]) -> Option<StatusFrame> {
    if buf.len() < CORE_LEN || &buf[..2] != magic {
        return None;
    }
    let mut padded = [0u8; FULL_LEN];
    let n = buf.len().min(FULL_LEN);
    padded[..n].copy_from_slice(&buf[..n]);
    Some(decode_body(&padded[2..]))
}

/// Decode an "St" echo. Foreign, short, or query datagrams give `None`.
pub fn try_decode(buf: &[u8]) -> Option<StatusFrame> {
    decode_with_magic(buf, STATUS_MAGIC)
}

/// Decode the reply to a [`QUERY_MAGIC`] query.
pub fn decode_query_reply(buf: &[u8]) -> Option<StatusFrame> {
    decode_with_magic(buf, QUERY_MAGIC)
}

/// Whether the two frames agree on the core fields (bytes 0..13). An echo
/// doing so answers the handshake, whatever its firmware byte says.
pub fn core_matches(a: &StatusFrame, b: &StatusFrame) -> bool {
    a.rx_phase == b.rx_phase
        && a.tx_phase == b.tx_phase
        && a.tx_level == b.tx_level
        && a.tx_control == b.tx_control
        && a.rx_control == b.rx_control
}

/// [`FrameCodec`] for the HiQSDR sync engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiqCodec;

impl FrameCodec for HiqCodec {
    type Frame = StatusFrame;

    const MAX_FRAME_LEN: usize = FULL_LEN;

    fn encode(&self, frame: &StatusFrame) -> Vec<u8> {
        encode(frame)
    }

    fn try_decode(&self, buf: &[u8]) -> Option<StatusFrame> {
        try_decode(buf)
    }

    fn handshake_matches(&self, wanted: &StatusFrame, observed: &StatusFrame) -> bool {
        core_matches(wanted, observed)
    }

    /// Compare only what the echoing firmware understands.
    fn converged(&self, wanted: &StatusFrame, observed: &StatusFrame) -> bool {
        let firmware = Some(observed.firmware);
        wanted.masked_for(firmware) == observed.masked_for(firmware)
    }

    fn firmware_version(&self, observed: &StatusFrame) -> u8 {
        observed.firmware
    }
}
