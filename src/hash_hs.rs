use crate::crypto::hash;
use crate::msgs::enums::{HashAlgorithm, ProtocolVersion};
use crate::msgs::message::{Message, MessagePayload};

/// This deals with keeping a record of the handshake payloads exchanged
/// so far, to feed the Finished calculation and renegotiation checks.
///
/// The transcript stays in buffered form for the whole handshake: the
/// hash (or pair of hashes) to apply depends on the negotiated version,
/// and a renegotiation starts a fresh transcript.
pub(crate) struct HandshakeHash {
    buffer: Vec<u8>,
}

impl HandshakeHash {
    pub(crate) fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Buffer a handshake message.
    ///
    /// Non-handshake messages (alerts, CCS) never enter the transcript.
    pub(crate) fn add_message(&mut self, m: &Message) -> &mut Self {
        if let MessagePayload::Handshake { encoded, .. } = &m.payload {
            self.add_raw(&encoded.0);
        }
        self
    }

    pub(crate) fn add_raw(&mut self, buf: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(buf);
        self
    }

    /// The hash of the transcript so far, in the form the Finished
    /// computation wants for `version`: MD5 followed by SHA-1 output for
    /// TLS 1.0/1.1, the PRF hash output for TLS 1.2.
    pub(crate) fn transcript_hash(&self, version: ProtocolVersion) -> Vec<u8> {
        match version {
            ProtocolVersion::TLSv1_2 => hash::digest(HashAlgorithm::SHA256, &self.buffer)
                .as_ref()
                .to_vec(),
            _ => {
                let mut out = Vec::with_capacity(36);
                out.extend_from_slice(hash::digest(HashAlgorithm::MD5, &self.buffer).as_ref());
                out.extend_from_slice(hash::digest(HashAlgorithm::SHA1, &self.buffer).as_ref());
                out
            }
        }
    }
}
