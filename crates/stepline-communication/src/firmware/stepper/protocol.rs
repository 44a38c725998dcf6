//! Stepper firmware command encoding
//!
//! Commands are single ASCII lines. The opcode is one character, followed
//! either by a bare integer or by a bracketed, comma-separated integer
//! list:
//!
//! | Line | Command |
//! |------|---------|
//! | `W` | [`Command::Wait`] |
//! | `D<ms>` | [`Command::Delay`] |
//! | `T[<id>,<arg>]` | [`Command::Trigger`] |
//! | `M[<dur>,<dx>,<dy>,<dz>,<id>]` | [`Command::Move`] |
//! | `S` | [`Command::Status`] |
//! | `C` | [`Command::Continue`] |
//! | `m[<steps/s>,<x>,<y>,<z>]` | [`Command::MoveTo`] |
//! | `V[<vx>,<vy>,<vz>]` | [`Command::MoveAt`] |

use crate::compiler::Block;
use std::fmt;
use std::str::FromStr;

/// A command understood by the stepper firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Buffered wait
    Wait,
    /// Buffered pause in milliseconds
    Delay {
        /// Duration in milliseconds
        ms: i16,
    },
    /// Buffered trigger
    Trigger {
        /// Trigger id
        id: i16,
        /// Trigger argument
        arg: i16,
    },
    /// Buffered relative move
    Move {
        /// Duration in milliseconds
        duration: i16,
        /// Step delta per axis
        steps: [i16; 3],
        /// Block id
        id: i16,
    },
    /// Status query
    Status,
    /// Resume after a trigger
    Continue,
    /// Direct move to an absolute step position
    MoveTo {
        /// Speed in steps per second
        speed: i32,
        /// Target step position per axis
        target: [i32; 3],
    },
    /// Direct move at a constant velocity
    MoveAt {
        /// Velocity per axis in steps per second
        velocity: [i32; 3],
    },
}

impl Command {
    /// True for commands the device stores in its block buffer
    pub fn is_buffered(&self) -> bool {
        matches!(
            self,
            Command::Wait | Command::Delay { .. } | Command::Trigger { .. } | Command::Move { .. }
        )
    }
}

impl From<Block> for Command {
    fn from(block: Block) -> Self {
        match block {
            Block::Wait => Command::Wait,
            Block::Delay { ms } => Command::Delay { ms },
            Block::Trigger { id, arg } => Command::Trigger { id, arg },
            Block::Move {
                duration,
                steps,
                id,
            } => Command::Move {
                duration,
                steps,
                id,
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Wait => write!(f, "W"),
            Command::Delay { ms } => write!(f, "D{}", ms),
            Command::Trigger { id, arg } => write!(f, "T[{},{}]", id, arg),
            Command::Move {
                duration,
                steps,
                id,
            } => write!(
                f,
                "M[{},{},{},{},{}]",
                duration, steps[0], steps[1], steps[2], id
            ),
            Command::Status => write!(f, "S"),
            Command::Continue => write!(f, "C"),
            Command::MoveTo { speed, target } => write!(
                f,
                "m[{},{},{},{}]",
                speed, target[0], target[1], target[2]
            ),
            Command::MoveAt { velocity } => {
                write!(f, "V[{},{},{}]", velocity[0], velocity[1], velocity[2])
            }
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let mut chars = line.chars();
        let opcode = chars.next().ok_or_else(|| "empty command".to_string())?;
        let rest = chars.as_str();

        match opcode {
            'W' if rest.is_empty() => Ok(Command::Wait),
            'S' if rest.is_empty() => Ok(Command::Status),
            'C' if rest.is_empty() => Ok(Command::Continue),
            'D' => {
                let ms = rest
                    .parse::<i16>()
                    .map_err(|e| format!("bad delay '{}': {}", rest, e))?;
                Ok(Command::Delay { ms })
            }
            'T' => {
                let [id, arg] = parse_args::<i16, 2>(rest)?;
                Ok(Command::Trigger { id, arg })
            }
            'M' => {
                let [duration, dx, dy, dz, id] = parse_args::<i16, 5>(rest)?;
                Ok(Command::Move {
                    duration,
                    steps: [dx, dy, dz],
                    id,
                })
            }
            'm' => {
                let [speed, x, y, z] = parse_args::<i32, 4>(rest)?;
                Ok(Command::MoveTo {
                    speed,
                    target: [x, y, z],
                })
            }
            'V' => {
                let velocity = parse_args::<i32, 3>(rest)?;
                Ok(Command::MoveAt { velocity })
            }
            _ => Err(format!("unknown command '{}'", line)),
        }
    }
}

/// Parse a bracketed list of exactly `N` integers
fn parse_args<T: FromStr + Copy + Default, const N: usize>(s: &str) -> Result<[T; N], String> {
    let inner = s
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("expected bracketed arguments, got '{}'", s))?;
    let mut values = [T::default(); N];
    let mut count = 0;
    for field in inner.split(',') {
        if count == N {
            return Err(format!("too many arguments in '{}'", s));
        }
        values[count] = field
            .trim()
            .parse::<T>()
            .map_err(|_| format!("bad argument '{}' in '{}'", field, s))?;
        count += 1;
    }
    if count != N {
        return Err(format!("expected {} arguments in '{}'", N, s));
    }
    Ok(values)
}
