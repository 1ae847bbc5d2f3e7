use crate::msgs::base::Payload;
use crate::msgs::message::PlainMessage;

/// TLS record fragments are at most 2^14 bytes of payload.
pub(crate) const MAX_FRAGMENT_LEN: usize = 16_384;

pub(crate) struct MessageFragmenter {
    max_frag: usize,
}

impl Default for MessageFragmenter {
    fn default() -> Self {
        Self {
            max_frag: MAX_FRAGMENT_LEN,
        }
    }
}

impl MessageFragmenter {
    /// Take the Message `msg` and re-fragment it into new messages whose
    /// fragment is no more than max_frag.  Return an iterator across
    /// those messages.
    pub(crate) fn fragment(&self, msg: PlainMessage) -> impl Iterator<Item = PlainMessage> + '_ {
        let typ = msg.typ;
        let version = msg.version;
        let payload = msg.payload.0;

        let mut chunks: Vec<PlainMessage> = payload
            .chunks(self.max_frag)
            .map(|chunk| PlainMessage {
                typ,
                version,
                payload: Payload::new(chunk),
            })
            .collect();

        // An empty payload (empty application data) still yields one
        // empty fragment.
        if chunks.is_empty() {
            chunks.push(PlainMessage {
                typ,
                version,
                payload: Payload::empty(),
            });
        }

        chunks.into_iter()
    }
}
