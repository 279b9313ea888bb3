//! MARC record leader parsing.
//!
//! The leader is the 24-byte fixed-length header at the start of every ISO 2709
//! record. The decoder only needs the structural positions from it:
//!
//! - Positions 0-4: Record length (5 digits)
//! - Position 9: Character coding scheme (' ' = MARC-8, 'a' = UTF-8)
//! - Positions 12-16: Base address of data (5 digits)
//!
//! Everything else, including the indicator and subfield code counts at
//! positions 10-11, is kept verbatim in [`Leader::text`], which is what ends up
//! in the `leader` column. Fields are always read with two indicators and
//! one-byte subfield codes, whatever those counts say.

use crate::encoding::MarcEncoding;
use crate::error::{MarcError, MarcResult};

/// Length of a leader in bytes.
pub const LEADER_LEN: usize = 24;

/// Structural view of a 24-byte MARC leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leader {
    /// Record length (5 digits) - positions 0-4
    pub record_length: u32,
    /// Character coding scheme - position 9
    pub character_coding: char,
    /// Base address of data (5 digits) - positions 12-16
    pub data_base_address: u32,
    /// The leader exactly as it appeared in the stream
    pub text: String,
}

impl Leader {
    /// Parse a leader from 24 bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are too short or a numeric position holds
    /// something other than ASCII digits.
    pub fn from_bytes(bytes: &[u8]) -> MarcResult<Self> {
        if bytes.len() < LEADER_LEN {
            return Err(MarcError::InvalidLeader(format!(
                "Leader must be at least {LEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let record_length = parse_digits(&bytes[0..5])?;
        let character_coding = bytes[9] as char;
        let data_base_address = parse_digits(&bytes[12..17])?;
        let text = String::from_utf8_lossy(&bytes[..LEADER_LEN]).into_owned();

        Ok(Leader {
            record_length,
            character_coding,
            data_base_address,
            text,
        })
    }

    /// Encoding of the record's field data, from position 9.
    #[must_use]
    pub fn encoding(&self) -> MarcEncoding {
        MarcEncoding::from_leader_char(self.character_coding)
    }

    /// Validate that the leader is suitable for binary record reading.
    ///
    /// # Errors
    ///
    /// Returns an error if `record_length` or `data_base_address` is less than
    /// 24, or if the base address points past the end of the record.
    pub fn validate_for_reading(&self) -> MarcResult<()> {
        if self.record_length < 24 {
            return Err(MarcError::InvalidLeader(format!(
                "Record length must be at least 24, got {}",
                self.record_length
            )));
        }
        if self.data_base_address < 24 {
            return Err(MarcError::InvalidLeader(format!(
                "Base address of data must be at least 24, got {}",
                self.data_base_address
            )));
        }
        if self.data_base_address > self.record_length {
            return Err(MarcError::InvalidLeader(format!(
                "Base address of data {} exceeds record length {}",
                self.data_base_address, self.record_length
            )));
        }
        Ok(())
    }
}

/// Parse 5-digit ASCII number from bytes
fn parse_digits(bytes: &[u8]) -> MarcResult<u32> {
    let s = String::from_utf8_lossy(bytes);
    s.parse::<u32>()
        .map_err(|_| MarcError::InvalidLeader(format!("Invalid numeric field: '{s}'")))
}
