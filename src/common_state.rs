use std::collections::VecDeque;

use crate::error::{Error, PeerMisbehaved};
use crate::msgs::alert::AlertMessagePayload;
use crate::msgs::enums::{AlertDescription, AlertLevel, ProtocolVersion};
use crate::msgs::fragmenter::MessageFragmenter;
use crate::msgs::hsjoiner::HandshakeJoiner;
use crate::msgs::message::{Message, MessagePayload, OpaqueMessage, PlainMessage};
use crate::record_layer::RecordLayer;
use crate::suites::SupportedCipherSuite;

/// The verify_data pair of the previous completed handshake, kept for
/// RFC 5746 secure renegotiation.
pub(crate) struct RenegotiationData {
    pub(crate) client_verify_data: Vec<u8>,
    pub(crate) server_verify_data: Vec<u8>,
}

/// Connection state common to every handshake on this connection.
pub(crate) struct CommonState {
    pub(crate) negotiated_version: Option<ProtocolVersion>,
    pub(crate) suite: Option<&'static SupportedCipherSuite>,
    pub(crate) record_layer: RecordLayer,
    pub(crate) hs_joiner: HandshakeJoiner,
    pub(crate) reneg_data: Option<RenegotiationData>,
    pub(crate) server_name: Option<String>,
    pub(crate) may_receive_application_data: bool,
    pub(crate) received_plaintext: Vec<u8>,
    pub(crate) has_sent_fatal_alert: bool,
    sendable_tls: VecDeque<OpaqueMessage>,
    fragmenter: MessageFragmenter,
}

impl CommonState {
    pub(crate) fn new() -> Self {
        Self {
            negotiated_version: None,
            suite: None,
            record_layer: RecordLayer::new(),
            hs_joiner: HandshakeJoiner::new(),
            reneg_data: None,
            server_name: None,
            may_receive_application_data: false,
            received_plaintext: Vec::new(),
            has_sent_fatal_alert: false,
            sendable_tls: VecDeque::new(),
            fragmenter: MessageFragmenter::default(),
        }
    }

    /// Fragment `m`, protect the fragments under the active context if
    /// there is one, and queue them for sending.
    ///
    /// `must_encrypt` asserts that protection is established; it is set
    /// for messages that may never travel in the clear.
    pub(crate) fn send_msg(&mut self, m: Message, must_encrypt: bool) -> Result<(), Error> {
        let plain = PlainMessage::from(m);
        let fragments: Vec<PlainMessage> = self.fragmenter.fragment(plain).collect();
        for fragment in fragments {
            self.send_single_fragment(fragment, must_encrypt)?;
        }
        Ok(())
    }

    fn send_single_fragment(&mut self, m: PlainMessage, must_encrypt: bool) -> Result<(), Error> {
        let em = match (self.record_layer.is_encrypting(), must_encrypt) {
            (true, _) => self.record_layer.encrypt_outgoing(m)?,
            (false, false) => m.into_unencrypted_opaque(),
            (false, true) => return Err(Error::EncryptError),
        };

        self.sendable_tls.push_back(em);
        Ok(())
    }

    /// Send a fatal alert describing `desc`, and return `err` for the
    /// caller to propagate.  Only the first fatal alert is sent.
    pub(crate) fn send_fatal_alert(
        &mut self,
        desc: AlertDescription,
        err: impl Into<Error>,
    ) -> Error {
        if !self.has_sent_fatal_alert {
            let m = self.build_alert(AlertLevel::Fatal, desc);
            // A failure to protect the alert must not mask the error
            // we are reporting.
            let _ = self.send_msg(m, false);
            self.has_sent_fatal_alert = true;
        }
        err.into()
    }

    pub(crate) fn send_warning_alert(&mut self, desc: AlertDescription) {
        let m = self.build_alert(AlertLevel::Warning, desc);
        let _ = self.send_msg(m, false);
    }

    fn build_alert(&self, level: AlertLevel, desc: AlertDescription) -> Message {
        Message {
            version: self
                .negotiated_version
                .unwrap_or(ProtocolVersion::TLSv1_0),
            payload: MessagePayload::Alert(AlertMessagePayload {
                level,
                description: desc,
            }),
        }
    }

    /// The handshake reassembly buffer must be empty whenever the key
    /// epoch changes or a new hello arrives.
    pub(crate) fn check_aligned_handshake(&mut self) -> Result<(), Error> {
        match self.hs_joiner.is_empty() {
            true => Ok(()),
            false => Err(self.send_fatal_alert(
                AlertDescription::UnexpectedMessage,
                PeerMisbehaved::KeyEpochWithPendingFragment,
            )),
        }
    }

    pub(crate) fn start_traffic(&mut self) {
        self.may_receive_application_data = true;
    }

    /// Fetch the queued outgoing records, oldest first.
    pub(crate) fn take_tls_messages(&mut self) -> Vec<OpaqueMessage> {
        self.sendable_tls.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::base::Payload;
    use crate::msgs::enums::ContentType;

    #[test]
    fn must_encrypt_refused_without_keys() {
        let mut common = CommonState::new();
        let m = Message {
            version: ProtocolVersion::TLSv1_2,
            payload: MessagePayload::ApplicationData(Payload::new(b"secret".to_vec())),
        };
        assert_eq!(common.send_msg(m, true), Err(Error::EncryptError));
    }

    #[test]
    fn only_one_fatal_alert_is_sent() {
        let mut common = CommonState::new();
        common.send_fatal_alert(AlertDescription::HandshakeFailure, Error::DecryptError);
        common.send_fatal_alert(AlertDescription::DecodeError, Error::DecryptError);

        let out = common.take_tls_messages();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].typ, ContentType::Alert);
        assert_eq!(out[0].payload.0, vec![0x02, 0x28]);
    }

    #[test]
    fn large_messages_are_fragmented() {
        let mut common = CommonState::new();
        let m = Message {
            version: ProtocolVersion::TLSv1_2,
            payload: MessagePayload::ApplicationData(Payload::new(vec![0x55; 20_000])),
        };
        common.send_msg(m, false).unwrap();

        let out = common.take_tls_messages();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload.0.len(), 16_384);
        assert_eq!(out[1].payload.0.len(), 20_000 - 16_384);
    }
}
