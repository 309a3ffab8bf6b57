//! Message types and wire format.
//!
//! Wire format:
//! ```text
//! +0  Kind (1 byte)
//! +1  Payload (kind-dependent)
//!
//! Heartbeat       (0x00): no payload
//! Join            (0x01): id list
//! Leave           (0x02): id list
//! Introduction    (0x03): string (user name), then id list
//!
//! string:  u16 LE byte length, then UTF-8 bytes
//! id list: u16 LE count, then that many strings
//! ```
//!
//! Bytes after a well-formed message are ignored, so a frame may carry
//! trailing data without failing to decode.

use thiserror::Error;

use crate::core::{
    DocumentId, UserName, KIND_HEARTBEAT, KIND_INTRODUCTION, KIND_JOIN, KIND_LEAVE,
    MAX_LIST_LEN, MAX_STRING_LEN,
};

/// A protocol message on the introduction endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Liveness ping. Causes no state change.
    Heartbeat,

    /// Announce interest in the listed document ids.
    Join {
        /// Ids to union into the sender's interest set.
        documents: Vec<DocumentId>,
    },

    /// Withdraw interest in the listed document ids.
    Leave {
        /// Ids to remove from the sender's interest set.
        documents: Vec<DocumentId>,
    },

    /// Another peer shares interest in the listed document ids.
    ///
    /// Sent by the server only; a client sending this is treated like any
    /// other unknown input and ignored by the dispatcher.
    Introduction {
        /// The overlapping peer.
        user: UserName,
        /// The common document ids.
        documents: Vec<DocumentId>,
    },
}

impl Message {
    /// Wire tag for this message kind.
    pub fn kind(&self) -> u8 {
        match self {
            Message::Heartbeat => KIND_HEARTBEAT,
            Message::Join { .. } => KIND_JOIN,
            Message::Leave { .. } => KIND_LEAVE,
            Message::Introduction { .. } => KIND_INTRODUCTION,
        }
    }

    /// Encode to wire format.
    ///
    /// Fails only if a name or id exceeds the u16 length prefix, or a list
    /// exceeds the u16 count prefix.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(self.wire_size_hint());
        buf.push(self.kind());
        match self {
            Message::Heartbeat => {}
            Message::Join { documents } | Message::Leave { documents } => {
                put_id_list(&mut buf, documents)?;
            }
            Message::Introduction { user, documents } => {
                put_string(&mut buf, user.as_str())?;
                put_id_list(&mut buf, documents)?;
            }
        }
        Ok(buf)
    }

    /// Decode from wire format. Trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut cursor = Cursor::new(data);
        let kind = cursor.u8()?;
        match kind {
            KIND_HEARTBEAT => Ok(Message::Heartbeat),
            KIND_JOIN => Ok(Message::Join {
                documents: cursor.id_list()?,
            }),
            KIND_LEAVE => Ok(Message::Leave {
                documents: cursor.id_list()?,
            }),
            KIND_INTRODUCTION => Ok(Message::Introduction {
                user: UserName::from(cursor.string()?),
                documents: cursor.id_list()?,
            }),
            other => Err(WireError::UnknownKind(other)),
        }
    }

    fn wire_size_hint(&self) -> usize {
        match self {
            Message::Heartbeat => 1,
            Message::Join { documents } | Message::Leave { documents } => {
                3 + documents.iter().map(|d| 2 + d.as_str().len()).sum::<usize>()
            }
            Message::Introduction { user, documents } => {
                3 + user.as_str().len()
                    + 2
                    + documents.iter().map(|d| 2 + d.as_str().len()).sum::<usize>()
            }
        }
    }
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<(), WireError> {
    if s.len() > MAX_STRING_LEN {
        return Err(WireError::Oversize { len: s.len() });
    }
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_id_list(buf: &mut Vec<u8>, ids: &[DocumentId]) -> Result<(), WireError> {
    if ids.len() > MAX_LIST_LEN {
        return Err(WireError::Oversize { len: ids.len() });
    }
    buf.extend_from_slice(&(ids.len() as u16).to_le_bytes());
    for id in ids {
        put_string(buf, id.as_str())?;
    }
    Ok(())
}

/// Byte-slice reader tracking how far decoding has progressed.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos + n;
        if self.data.len() < end {
            return Err(WireError::TooShort {
                expected: end,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn string(&mut self) -> Result<String, WireError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;
        Ok(s.to_owned())
    }

    fn id_list(&mut self) -> Result<Vec<DocumentId>, WireError> {
        let count = self.u16()? as usize;
        let mut ids = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            ids.push(DocumentId::from(self.string()?));
        }
        Ok(ids)
    }
}

/// Message encoding/decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Input data is shorter than required.
    #[error("message too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// The kind tag is not one this version understands.
    ///
    /// The dispatcher ignores these silently; every other variant raises a
    /// decode-failure event.
    #[error("unknown message kind: 0x{0:02x}")]
    UnknownKind(u8),

    /// A string or list exceeds its u16 length prefix.
    #[error("field too large for wire format: {len}")]
    Oversize {
        /// Offending length.
        len: usize,
    },
}
