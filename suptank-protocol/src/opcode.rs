//! Command and response opcodes.
//!
//! Every message on the wire starts with one signed 16-bit opcode. Requests
//! and responses share the same code space.

use crate::error::ProtocolError;
use std::fmt;

/// A protocol opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum Opcode {
    /// Login request: followed by login and password strings.
    Login = 1001,
    /// Login accepted for an administrator.
    AdminOk = 1002,
    /// Request accepted.
    Ok = 1003,
    /// Request rejected.
    Error = 1004,
    /// Close the session.
    Logout = 1005,
    /// Read the current plant snapshot.
    GetData = 1006,
    /// Set valve 1: followed by an i16, nonzero = open.
    SetV1 = 1007,
    /// Set valve 2: followed by an i16, nonzero = open.
    SetV2 = 1008,
    /// Set the pump input: followed by an i16 carrying the raw value.
    SetPump = 1009,
}

impl Opcode {
    /// All opcodes in code order.
    pub const ALL: [Opcode; 9] = [
        Opcode::Login,
        Opcode::AdminOk,
        Opcode::Ok,
        Opcode::Error,
        Opcode::Logout,
        Opcode::GetData,
        Opcode::SetV1,
        Opcode::SetV2,
        Opcode::SetPump,
    ];

    /// Returns the wire code.
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Looks up an opcode by wire code.
    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    /// Returns the protocol name of this opcode.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Login => "LOGIN",
            Opcode::AdminOk => "ADMIN_OK",
            Opcode::Ok => "OK",
            Opcode::Error => "ERROR",
            Opcode::Logout => "LOGOUT",
            Opcode::GetData => "GET_DATA",
            Opcode::SetV1 => "SET_V1",
            Opcode::SetV2 => "SET_V2",
            Opcode::SetPump => "SET_PUMP",
        }
    }
}

impl TryFrom<i16> for Opcode {
    type Error = ProtocolError;

    fn try_from(code: i16) -> Result<Self, ProtocolError> {
        Self::from_code(code).ok_or(ProtocolError::UnknownOpcode(code))
    }
}

impl From<Opcode> for i16 {
    fn from(op: Opcode) -> Self {
        op.code()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
