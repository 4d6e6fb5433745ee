//! UHF transceiver "Sx" status frame.
//!
//! A fixed 96-byte frame. The first 16 bytes are a header the device fills
//! in on echo (firmware version at byte 2); everything from byte 16 on is
//! the payload the host controls, and only the payload takes part in the
//! comparison of wanted and echoed frames.
//!
//! ```text
//! offset size field
//!  0     2    "Sx"
//!  2     1    firmware version (echo only)
//!  3    13    reserved
//! 16     1    channel 0 decimation stage 1 - 1
//! 17     1    channel 0 decimation stage 2 - 1
//! 18     4    channel 0 tune phase
//! 22     4    channel 1 tune phase
//! 26     1    flags, see `flags`
//! 27     1    scan block count
//! 28     2    scan samples per block
//! 30     4    scan phase increment
//! 34     1    channel 1 decimation stage 1 - 1
//! 35     1    channel 1 decimation stage 2 - 1
//! 36    24    PLL0 registers R0..R5
//! 60    24    PLL1 registers R0..R5
//! 84     6    transmit DDS command
//! 90     2    DC correction I
//! 92     2    DC correction Q
//! 94     2    reserved
//! ```

use bytes::{Buf, BufMut, BytesMut};
use sdrlink_core::pll::PllRegisterSet;
use sdrlink_core::sync::FrameCodec;

pub const MAGIC: &[u8; 2] = b"Sx";
pub const FRAME_LEN: usize = 96;
/// Start of the host-controlled payload.
pub const PAYLOAD_OFFSET: usize = 16;
const VERSION_OFFSET: usize = 2;

/// Bits of the flag byte (offset 26).
pub mod flags {
    pub const CH0_ENABLE: u8 = 0x01;
    pub const CH1_ENABLE: u8 = 0x02;
    pub const SCAN_ENABLE: u8 = 0x04;
    /// Receive ADF4351 registers changed; the FPGA reloads the part.
    pub const PLL0_CHANGED: u8 = 0x08;
    /// Transmit ADF4351 registers changed.
    pub const PLL1_CHANGED: u8 = 0x10;
    /// Transmit DDS tuning word changed.
    pub const DDS_CHANGED: u8 = 0x20;
    pub const PTT: u8 = 0x40;
    /// Mode is CWL or CWU.
    pub const MODE_CW: u8 = 0x80;
    pub const DIRTY_MASK: u8 = PLL0_CHANGED | PLL1_CHANGED | DDS_CHANGED;
}

/// Two-stage CIC decimation of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stages {
    pub first: u16,
    pub second: u16,
}

impl Stages {
    pub const fn new(first: u16, second: u16) -> Self {
        Stages { first, second }
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.put_u8(self.first.saturating_sub(1).min(255) as u8);
        buf.put_u8(self.second.saturating_sub(1).min(255) as u8);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        Stages {
            first: buf.get_u8() as u16 + 1,
            second: buf.get_u8() as u16 + 1,
        }
    }
}

/// Decoded "Sx" frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UhfFrame {
    pub firmware: u8,
    pub ch0_decimation: Stages,
    pub ch0_phase: u32,
    pub ch1_phase: u32,
    pub flags: u8,
    pub scan_blocks: u8,
    pub scan_samples: u16,
    pub scan_phase: u32,
    pub ch1_decimation: Stages,
    pub pll0: PllRegisterSet,
    pub pll1: PllRegisterSet,
    pub dds_command: [u8; 6],
    pub dc_i: i16,
    pub dc_q: i16,
}

impl UhfFrame {
    /// The frame with sample streaming stopped, the transmitter unkeyed
    /// and nothing reprogrammed.
    pub fn safe(&self) -> UhfFrame {
        UhfFrame {
            flags: 0,
            scan_blocks: 0,
            ..*self
        }
    }

    /// Whether the payloads (bytes 16 on) are identical.
    pub fn payload_eq(&self, other: &UhfFrame) -> bool {
        UhfFrame { firmware: 0, ..*self } == UhfFrame { firmware: 0, ..*other }
    }
}

pub fn encode(frame: &UhfFrame) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(FRAME_LEN);
    buf.put_slice(MAGIC);
    buf.put_u8(frame.firmware);
    buf.put_bytes(0, PAYLOAD_OFFSET - 3);
    frame.ch0_decimation.encode(&mut buf);
    buf.put_u32_le(frame.ch0_phase);
    buf.put_u32_le(frame.ch1_phase);
    buf.put_u8(frame.flags);
    buf.put_u8(frame.scan_blocks);
    buf.put_u16_le(frame.scan_samples);
    buf.put_u32_le(frame.scan_phase);
    frame.ch1_decimation.encode(&mut buf);
    buf.put_slice(&frame.pll0.to_le_bytes());
    buf.put_slice(&frame.pll1.to_le_bytes());
    buf.put_slice(&frame.dds_command);
    buf.put_i16_le(frame.dc_i);
    buf.put_i16_le(frame.dc_q);
    buf.put_bytes(0, FRAME_LEN - buf.len());
    buf.to_vec()
}

/// Decode an echo; anything shorter than a frame or with another magic is
/// foreign.
pub fn try_decode(buf: &[u8]) -> Option<UhfFrame> {
    if buf.len() < FRAME_LEN || &buf[..2] != MAGIC {
        return None;
    }
    let firmware = buf[VERSION_OFFSET];
    let mut p = &buf[PAYLOAD_OFFSET..FRAME_LEN];
    let ch0_decimation = Stages::decode(&mut p);
    let ch0_phase = p.get_u32_le();
    let ch1_phase = p.get_u32_le();
    let flags = p.get_u8();
    let scan_blocks = p.get_u8();
    let scan_samples = p.get_u16_le();
    let scan_phase = p.get_u32_le();
    let ch1_decimation = Stages::decode(&mut p);
    let pll0 = PllRegisterSet::from_le_bytes(p)?;
    p.advance(PllRegisterSet::WIRE_LEN);
    let pll1 = PllRegisterSet::from_le_bytes(p)?;
    p.advance(PllRegisterSet::WIRE_LEN);
    let mut dds_command = [0u8; 6];
    p.copy_to_slice(&mut dds_command);
    Some(UhfFrame {
        firmware,
        ch0_decimation,
        ch0_phase,
        ch1_phase,
        flags,
        scan_blocks,
        scan_samples,
        scan_phase,
        ch1_decimation,
        pll0,
        pll1,
        dds_command,
        dc_i: p.get_i16_le(),
        dc_q: p.get_i16_le(),
    })
}

/// [`FrameCodec`] for the UHF sync engine. Handshake and convergence both
/// compare payloads; the header only carries the version.
#[derive(Debug, Clone, Copy, Default)]
pub struct UhfCodec;

impl FrameCodec for UhfCodec {
    type Frame = UhfFrame;

    const MAX_FRAME_LEN: usize = FRAME_LEN;

    fn encode(&self, frame: &UhfFrame) -> Vec<u8> {
        encode(frame)
    }

    fn try_decode(&self, buf: &[u8]) -> Option<UhfFrame> {
        try_decode(buf)
    }

    fn handshake_matches(&self, wanted: &UhfFrame, observed: &UhfFrame) -> bool {
        wanted.payload_eq(observed)
    }

    fn converged(&self, wanted: &UhfFrame, observed: &UhfFrame) -> bool {
        wanted.payload_eq(observed)
    }

    fn firmware_version(&self, observed: &UhfFrame) -> u8 {
        observed.firmware
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UhfFrame {
        UhfFrame {
            firmware: 0,
            ch0_decimation: Stages::new(6, 12),
            ch0_phase: 0x1234_5678,
            ch1_phase: 0xFEDC_BA98,
            flags: flags::CH0_ENABLE | flags::CH1_ENABLE | flags::PLL0_CHANGED,
            scan_blocks: 0,
            scan_samples: 1,
            scan_phase: 0,
            ch1_decimation: Stages::new(3, 12),
            pll0: PllRegisterSet {
                words: [1, 2, 3, 4, 5, 6],
            },
            pll1: PllRegisterSet {
                words: [7, 8, 9, 10, 11, 12],
            },
            dds_command: [40, 0xB2, 0xC3, 0xD4, 0xE5, 4],
            dc_i: -5,
            dc_q: 300,
        }
    }

    #[test]
    fn layout() {
        let bytes = encode(&sample());
        assert_eq!(bytes.len(), FRAME_LEN);
        assert_eq!(&bytes[..2], b"Sx");
        assert!(bytes[2..16].iter().all(|&b| b == 0));
        assert_eq!(bytes[16], 5);
        assert_eq!(bytes[17], 11);
        assert_eq!(&bytes[18..22], &0x1234_5678u32.to_le_bytes());
        assert_eq!(bytes[26], 0x0B);
        assert_eq!(&bytes[28..30], &[1, 0]);
        assert_eq!(bytes[34], 2);
        assert_eq!(bytes[35], 11);
        assert_eq!(&bytes[36..40], &[1, 0, 0, 0]);
        assert_eq!(&bytes[60..64], &[7, 0, 0, 0]);
        assert_eq!(&bytes[84..90], &[40, 0xB2, 0xC3, 0xD4, 0xE5, 4]);
        assert_eq!(&bytes[90..92], &(-5i16).to_le_bytes());
        assert_eq!(&bytes[92..94], &300i16.to_le_bytes());
        assert_eq!(&bytes[94..], &[0, 0]);
    }

    #[test]
    fn flag_bits() {
        let bit = |flag: u8| {
            let frame = UhfFrame { flags: flag, ..sample() };
            encode(&frame)[26]
        };
        assert_eq!(bit(flags::CH0_ENABLE), 1 << 0);
        assert_eq!(bit(flags::CH1_ENABLE), 1 << 1);
        assert_eq!(bit(flags::SCAN_ENABLE), 1 << 2);
        assert_eq!(bit(flags::PLL0_CHANGED), 1 << 3);
        assert_eq!(bit(flags::PLL1_CHANGED), 1 << 4);
        assert_eq!(bit(flags::DDS_CHANGED), 1 << 5);
        assert_eq!(bit(flags::PTT), 1 << 6);
        assert_eq!(bit(flags::MODE_CW), 1 << 7);
        assert_eq!(
            bit(flags::CH0_ENABLE | flags::CH1_ENABLE | flags::PLL0_CHANGED | flags::PLL1_CHANGED),
            0x1B
        );
    }

    #[test]
    fn echo_carries_version_in_header() {
        let mut bytes = encode(&sample());
        bytes[2] = 7;
        bytes[5] = 0xEE;
        let echo = try_decode(&bytes).unwrap();
        assert_eq!(echo.firmware, 7);
        assert!(echo.payload_eq(&sample()));
        assert_ne!(echo, sample());
    }

    #[test]
    fn rejects_foreign_and_short() {
        let mut bytes = encode(&sample());
        assert!(try_decode(&bytes[..95]).is_none());
        bytes[1] = b't';
        assert!(try_decode(&bytes).is_none());
        // A HiQSDR echo is not a UHF frame.
        let mut st = vec![b'S', b't'];
        st.resize(FRAME_LEN, 0);
        assert!(try_decode(&st).is_none());
    }

    #[test]
    fn payload_difference_is_not_converged() {
        let codec = UhfCodec;
        let a = sample();
        let b = UhfFrame {
            ch1_phase: a.ch1_phase + 1,
            ..a
        };
        assert!(!codec.converged(&a, &b));
        assert!(codec.converged(&a, &UhfFrame { firmware: 3, ..a }));
    }

    #[test]
    fn safe_frame_stops_streaming() {
        let keyed = UhfFrame {
            flags: sample().flags | flags::PTT | flags::MODE_CW,
            ..sample()
        };
        let safe = keyed.safe();
        assert_eq!(safe.flags, 0);
        assert_eq!(safe.pll0, sample().pll0);
    }
}
