// Frame layout for Wake-on-LAN/WAN magic packets.
//
// | offset | length    | content                          |
// |--------|-----------|----------------------------------|
// | 0      | 6         | synchronization scheme, 0xff x 6 |
// | 6      | 96        | target hardware address x 16     |
// | 102    | 0, 4 or 6 | optional SecureOn password       |

pub const SYNCHRONIZATION_SCHEME: [u8; 6] = [0xff; 6];
pub const TARGET_LENGTH: usize = 6;
const TARGET_REPETITIONS: usize = 16;
const HEADER_LENGTH: usize = SYNCHRONIZATION_SCHEME.len() + TARGET_LENGTH * TARGET_REPETITIONS;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid target address")]
    InvalidTarget(usize),
    #[error("invalid password")]
    InvalidPassword(usize),
}

/// A single wake request: the MAC-48 address to wake and, for devices that
/// require one, the password appended after the repeated address.
#[derive(Clone, Copy, Debug)]
pub struct MagicPacket<'a> {
    pub target: &'a [u8],
    pub password: &'a [u8],
}

impl<'a> MagicPacket<'a> {
    pub fn new(target: &'a [u8], password: &'a [u8]) -> Self {
        Self { target, password }
    }

    /// Builds the binary frame. Nothing is produced unless both the target
    /// and the password have a valid length.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        if self.target.len() != TARGET_LENGTH {
            return Err(Error::InvalidTarget(self.target.len()));
        }
        match self.password.len() {
            0 | 4 | 6 => {}
            n => return Err(Error::InvalidPassword(n)),
        }

        let mut data = Vec::with_capacity(HEADER_LENGTH + self.password.len());
        data.extend_from_slice(&SYNCHRONIZATION_SCHEME);
        for _ in 0..TARGET_REPETITIONS {
            data.extend_from_slice(self.target);
        }
        data.extend_from_slice(self.password);
        Ok(data)
    }
}

pub fn encode(target: &[u8], password: &[u8]) -> Result<Vec<u8>, Error> {
    MagicPacket::new(target, password).encode()
}
