use crate::error::InvalidMessage;
use crate::msgs::base::Payload;
use crate::msgs::codec::{u24, Codec, Reader};
use crate::msgs::enums::{ContentType, ProtocolVersion};
use crate::msgs::handshake::HandshakeMessagePayload;
use crate::msgs::message::{Message, MessagePayload, PlainMessage};

const HEADER_SIZE: usize = 1 + 3;

/// This works to reconstruct TLS handshake messages
/// from individual TLS messages.  It's guaranteed that
/// TLS messages output from this layer contain precisely
/// one handshake payload.
pub(crate) struct HandshakeJoiner {
    /// The message payload we're currently accumulating.
    buf: Vec<u8>,

    /// The protocol version of the last record added to the buffer,
    /// carried onto the messages we produce.
    version: ProtocolVersion,
}

impl HandshakeJoiner {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::new(),
            version: ProtocolVersion::TLSv1_0,
        }
    }

    /// Do we currently have no buffered partial message?
    ///
    /// The handshake layer must be empty whenever the key epoch changes;
    /// the state machine checks this at every ChangeCipherSpec and hello
    /// boundary.
    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the contents of the given message and add them to our buffer.
    /// The caller has already checked `msg.typ == ContentType::Handshake`.
    pub(crate) fn push(&mut self, msg: PlainMessage) {
        debug_assert_eq!(msg.typ, ContentType::Handshake);
        self.version = msg.version;
        self.buf.extend_from_slice(&msg.payload.0);
    }

    /// Remove and return one complete handshake message from the buffer,
    /// or None if there is not yet a complete one.
    pub(crate) fn pop(&mut self) -> Result<Option<Message>, InvalidMessage> {
        let len = match self.complete_prefix_len() {
            Some(len) => len,
            None => return Ok(None),
        };

        let parsed = HandshakeMessagePayload::read_bytes(&self.buf[..len])?;
        let encoded = Payload::new(&self.buf[..len]);
        self.buf.drain(..len);

        Ok(Some(Message {
            version: self.version,
            payload: MessagePayload::Handshake { parsed, encoded },
        }))
    }

    /// Length of the complete message at the front of the buffer, if any.
    fn complete_prefix_len(&self) -> Option<usize> {
        if self.buf.len() < HEADER_SIZE {
            return None;
        }

        let mut r = Reader::init(&self.buf[1..HEADER_SIZE]);
        let body_len = usize::from(u24::read(&mut r).ok()?);

        match self.buf.len() >= HEADER_SIZE + body_len {
            true => Some(HEADER_SIZE + body_len),
            false => None,
        }
    }
}
