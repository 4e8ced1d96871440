//! Plant snapshot record.
//!
//! Record layout (12 bytes, integers big-endian):
//!
//! ```text
//! +----+----+--------+--------+------------+-----------+------+-----+
//! | v1 | v2 |   h1   |   h2   | pump_input | pump_flow | ovfl | pad |
//! | 1  | 1  |   2    |   2    |     2      |     2     |  1   |  1  |
//! +----+----+--------+--------+------------+-----------+------+-----+
//! ```
//!
//! The trailing pad byte is always written as zero and ignored on decode.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, BytesMut};

/// Size of an encoded snapshot in bytes.
pub const SNAPSHOT_SIZE: usize = 12;

/// Instantaneous, immutable read of the plant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlantSnapshot {
    /// Valve 1 is open.
    pub v1_open: bool,
    /// Valve 2 is open.
    pub v2_open: bool,
    /// Tank 1 level (0..=65535).
    pub h1: u16,
    /// Tank 2 level (0..=65535).
    pub h2: u16,
    /// Pump input set-point.
    pub pump_input: u16,
    /// Measured pump flow.
    pub pump_flow: u16,
    /// Some tank is overflowing.
    pub overflowing: bool,
}

impl PlantSnapshot {
    /// Appends the encoded record to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(SNAPSHOT_SIZE);
        buf.put_u8(self.v1_open as u8);
        buf.put_u8(self.v2_open as u8);
        buf.put_u16(self.h1);
        buf.put_u16(self.h2);
        buf.put_u16(self.pump_input);
        buf.put_u16(self.pump_flow);
        buf.put_u8(self.overflowing as u8);
        buf.put_u8(0);
    }

    /// Returns the encoded record.
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_SIZE] {
        let mut buf = BytesMut::with_capacity(SNAPSHOT_SIZE);
        self.encode(&mut buf);
        let mut out = [0u8; SNAPSHOT_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decodes a record. Any nonzero byte decodes as `true`.
    pub fn decode(mut data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < SNAPSHOT_SIZE {
            return Err(ProtocolError::Truncated {
                needed: SNAPSHOT_SIZE,
                got: data.len(),
            });
        }

        let v1_open = data.get_u8() != 0;
        let v2_open = data.get_u8() != 0;
        let h1 = data.get_u16();
        let h2 = data.get_u16();
        let pump_input = data.get_u16();
        let pump_flow = data.get_u16();
        let overflowing = data.get_u8() != 0;

        Ok(Self {
            v1_open,
            v2_open,
            h1,
            h2,
            pump_input,
            pump_flow,
            overflowing,
        })
    }
}
