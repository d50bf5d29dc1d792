use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("malformed hardware address {0:?}")]
    Malformed(String),
}

/// A MAC-48 hardware address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

// Accepts xx:xx:xx:xx:xx:xx, xx-xx-xx-xx-xx-xx and xxxx.xxxx.xxxx.
impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || Error::Malformed(s.to_string());

        let (sep, group_len) = if s.len() == 14 && s.as_bytes()[4] == b'.' {
            ('.', 4)
        } else if s.len() == 17 && s.as_bytes()[2] == b':' {
            (':', 2)
        } else if s.len() == 17 && s.as_bytes()[2] == b'-' {
            ('-', 2)
        } else {
            return Err(malformed());
        };

        let mut octets = [0u8; 6];
        let mut i = 0;
        for group in s.split(sep) {
            if group.len() != group_len || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            for pair in group.as_bytes().chunks(2) {
                if i == octets.len() {
                    return Err(malformed());
                }
                // Only ascii hex digits remain, so the pair is valid utf8.
                let pair = std::str::from_utf8(pair).map_err(|_| malformed())?;
                octets[i] = u8::from_str_radix(pair, 16).map_err(|_| malformed())?;
                i += 1;
            }
        }
        if i != octets.len() {
            return Err(malformed());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}
