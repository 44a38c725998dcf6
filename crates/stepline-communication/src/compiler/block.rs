//! Wire-level blocks
//!
//! A [`Block`] is the unit the firmware buffers and executes. All integer
//! fields are 16 bits wide on the device.

use crate::firmware::stepper::protocol::Command;

/// Block ids wrap around at this value
pub const BLOCK_ID_MODULUS: u16 = 10000;

/// One buffered firmware instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// Wait until the device has finished all previous blocks
    Wait,
    /// Step every axis by `steps` over `duration` milliseconds
    Move {
        /// Duration in milliseconds
        duration: i16,
        /// Step delta per axis
        steps: [i16; 3],
        /// Block id, modulo [`BLOCK_ID_MODULUS`]
        id: i16,
    },
    /// Pause for `ms` milliseconds
    Delay {
        /// Duration in milliseconds
        ms: i16,
    },
    /// Stop and report trigger `id` to the host
    Trigger {
        /// Index into the trigger table
        id: i16,
        /// Argument registered with the trigger
        arg: i16,
    },
}

impl Block {
    /// Wire encoding of the block, without line terminator
    pub fn encode(&self) -> String {
        Command::from(*self).to_string()
    }

    /// Time the device spends on the block, in milliseconds
    pub fn duration_ms(&self) -> u32 {
        match self {
            Block::Move { duration, .. } => *duration as u32,
            Block::Delay { ms } => *ms as u32,
            Block::Wait | Block::Trigger { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_blocks() {
        assert_eq!(Block::Wait.encode(), "W");
        assert_eq!(Block::Delay { ms: 32767 }.encode(), "D32767");
        assert_eq!(Block::Trigger { id: 2, arg: -5 }.encode(), "T[2,-5]");
        assert_eq!(
            Block::Move {
                duration: 14,
                steps: [3, -2, 0],
                id: 9999
            }
            .encode(),
            "M[14,3,-2,0,9999]"
        );
    }
}
