use crate::cipher::{MessageDecrypter, MessageEncrypter};
use crate::error::Error;
use crate::msgs::message::{OpaqueMessage, PlainMessage};

#[derive(PartialEq)]
enum DirectionState {
    /// No keying material.
    Invalid,

    /// Keying material in use.
    Active,
}

/// Record layer that tracks decryption and encryption keys.
///
/// Fresh contexts are derived when the master secret is established,
/// carried by the handshake states, and installed here by the
/// respective `ChangeCipherSpec`.  On renegotiation the next
/// handshake's contexts replace them atomically, resetting the
/// sequence numbers.
pub(crate) struct RecordLayer {
    message_encrypter: Box<dyn MessageEncrypter>,
    message_decrypter: Box<dyn MessageDecrypter>,
    write_seq: u64,
    read_seq: u64,
    encrypt_state: DirectionState,
    decrypt_state: DirectionState,
}

impl RecordLayer {
    /// Create new record layer with no keys.
    pub(crate) fn new() -> Self {
        Self {
            message_encrypter: <dyn MessageEncrypter>::invalid(),
            message_decrypter: <dyn MessageDecrypter>::invalid(),
            write_seq: 0,
            read_seq: 0,
            encrypt_state: DirectionState::Invalid,
            decrypt_state: DirectionState::Invalid,
        }
    }

    /// Decrypt a TLS message.
    ///
    /// `encr` is a decoded message allegedly received from the peer.
    /// If the decryption direction is not yet active, the message is
    /// passed through untouched.
    pub(crate) fn decrypt_incoming(&mut self, encr: OpaqueMessage) -> Result<PlainMessage, Error> {
        if self.decrypt_state != DirectionState::Active {
            return Ok(encr.into_plain_message());
        }

        let seq = self.read_seq;
        let plain = self
            .message_decrypter
            .decrypt(encr, seq)?;
        self.read_seq += 1;
        Ok(plain)
    }

    /// Encrypt a TLS message.
    ///
    /// `plain` is a TLS message we'd like to send.  The encryption
    /// direction must be active.
    pub(crate) fn encrypt_outgoing(&mut self, plain: PlainMessage) -> Result<OpaqueMessage, Error> {
        debug_assert!(self.encrypt_state == DirectionState::Active);
        let seq = self.write_seq;
        self.write_seq += 1;
        self.message_encrypter.encrypt(plain, seq)
    }

    /// Start using the given `MessageEncrypter` for future outgoing
    /// message encryption, from sequence number zero.
    pub(crate) fn set_message_encrypter(&mut self, cipher: Box<dyn MessageEncrypter>) {
        self.message_encrypter = cipher;
        self.write_seq = 0;
        self.encrypt_state = DirectionState::Active;
    }

    /// Start using the given `MessageDecrypter` for future incoming
    /// message decryption, from sequence number zero.
    pub(crate) fn set_message_decrypter(&mut self, cipher: Box<dyn MessageDecrypter>) {
        self.message_decrypter = cipher;
        self.read_seq = 0;
        self.decrypt_state = DirectionState::Active;
    }

    pub(crate) fn is_encrypting(&self) -> bool {
        self.encrypt_state == DirectionState::Active
    }

    pub(crate) fn is_decrypting(&self) -> bool {
        self.decrypt_state == DirectionState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::base::Payload;
    use crate::msgs::enums::{ContentType, ProtocolVersion};

    struct PassThroughDecrypter;

    impl MessageDecrypter for PassThroughDecrypter {
        fn decrypt(&mut self, m: OpaqueMessage, _: u64) -> Result<PlainMessage, Error> {
            Ok(m.into_plain_message())
        }
    }

    fn opaque() -> OpaqueMessage {
        OpaqueMessage {
            typ: ContentType::Handshake,
            version: ProtocolVersion::TLSv1_2,
            payload: Payload::new(vec![0xc0, 0xff, 0xee]),
        }
    }

    #[test]
    fn passes_through_before_activation() {
        let mut record_layer = RecordLayer::new();
        assert!(!record_layer.is_decrypting());
        assert!(!record_layer.is_encrypting());

        let plain = record_layer.decrypt_incoming(opaque()).unwrap();
        assert_eq!(plain.payload.0, vec![0xc0, 0xff, 0xee]);
        assert_eq!(record_layer.read_seq, 0);
    }

    #[test]
    fn sequence_number_advances_per_record() {
        let mut record_layer = RecordLayer::new();
        record_layer.set_message_decrypter(Box::new(PassThroughDecrypter));
        assert!(record_layer.is_decrypting());

        for expect in 0..4 {
            assert_eq!(record_layer.read_seq, expect);
            record_layer.decrypt_incoming(opaque()).unwrap();
        }
    }

    #[test]
    fn replacing_keys_resets_sequence_numbers() {
        let mut record_layer = RecordLayer::new();
        record_layer.set_message_decrypter(Box::new(PassThroughDecrypter));
        record_layer.decrypt_incoming(opaque()).unwrap();
        assert_eq!(record_layer.read_seq, 1);

        record_layer.set_message_decrypter(Box::new(PassThroughDecrypter));
        assert_eq!(record_layer.read_seq, 0);
        assert!(record_layer.is_decrypting());
    }
}
