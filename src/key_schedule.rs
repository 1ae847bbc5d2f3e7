//! Derivation of the master secret and the per-direction record
//! protection contexts (RFC 5246 §6.3, §8.1).

use zeroize::Zeroize;

use crate::cipher::{self, MessageDecrypter, MessageEncrypter};
use crate::msgs::enums::ProtocolVersion;
use crate::prf::prf;
use crate::suites::SupportedCipherSuite;

/// The randoms exchanged in the hello messages.
pub(crate) struct ConnectionRandoms {
    pub(crate) client: [u8; 32],
    pub(crate) server: [u8; 32],
}

impl ConnectionRandoms {
    pub(crate) fn new(client: [u8; 32], server: [u8; 32]) -> Self {
        Self { client, server }
    }
}

/// Per-connection keying material.
pub(crate) struct ConnectionSecrets {
    pub(crate) randoms: ConnectionRandoms,
    suite: &'static SupportedCipherSuite,
    version: ProtocolVersion,
    master_secret: [u8; 48],
}

impl ConnectionSecrets {
    /// Derive the master secret from a 48-byte pre-master secret.
    ///
    /// The caller owns `pms` and is responsible for zeroizing it.
    pub(crate) fn from_premaster(
        pms: &[u8],
        version: ProtocolVersion,
        suite: &'static SupportedCipherSuite,
        randoms: ConnectionRandoms,
    ) -> Self {
        let mut ret = Self {
            randoms,
            suite,
            version,
            master_secret: [0u8; 48],
        };

        let randoms = join_randoms(&ret.randoms.client, &ret.randoms.server);
        prf(
            &mut ret.master_secret,
            version,
            pms,
            b"master secret",
            &randoms,
        );
        ret
    }

    /// Make the record protection contexts for both directions, on the
    /// server side: the decrypter consumes client-to-server traffic, the
    /// encrypter produces server-to-client traffic.  Both start at
    /// sequence number zero when the record layer installs them.
    pub(crate) fn make_cipher_pair(&self) -> (Box<dyn MessageDecrypter>, Box<dyn MessageEncrypter>) {
        // Make a key block, and chop it up.
        let mut key_block = self.make_key_block();
        let suite = self.suite;

        let mac_key_len = suite.mac_key_len();
        let enc_key_len = suite.enc_key_len();
        let iv_len = suite.fixed_iv_len(self.version);

        let (client_write_mac_key, rest) = key_block.split_at(mac_key_len);
        let (server_write_mac_key, rest) = rest.split_at(mac_key_len);
        let (client_write_key, rest) = rest.split_at(enc_key_len);
        let (server_write_key, rest) = rest.split_at(enc_key_len);
        let (client_write_iv, rest) = rest.split_at(iv_len);
        let (server_write_iv, _) = rest.split_at(iv_len);

        let pair = (
            cipher::new_decrypter(
                suite,
                self.version,
                client_write_key,
                client_write_iv,
                client_write_mac_key,
            ),
            cipher::new_encrypter(
                suite,
                self.version,
                server_write_key,
                server_write_iv,
                server_write_mac_key,
            ),
        );

        key_block.zeroize();
        pair
    }

    /// The client's view of the same key block, for tests that play the
    /// peer role.
    #[cfg(test)]
    pub(crate) fn make_client_cipher_pair(
        &self,
    ) -> (Box<dyn MessageEncrypter>, Box<dyn MessageDecrypter>) {
        let mut key_block = self.make_key_block();
        let suite = self.suite;

        let mac_key_len = suite.mac_key_len();
        let enc_key_len = suite.enc_key_len();
        let iv_len = suite.fixed_iv_len(self.version);

        let (client_write_mac_key, rest) = key_block.split_at(mac_key_len);
        let (server_write_mac_key, rest) = rest.split_at(mac_key_len);
        let (client_write_key, rest) = rest.split_at(enc_key_len);
        let (server_write_key, rest) = rest.split_at(enc_key_len);
        let (client_write_iv, rest) = rest.split_at(iv_len);
        let (server_write_iv, _) = rest.split_at(iv_len);

        let pair = (
            cipher::new_encrypter(
                suite,
                self.version,
                client_write_key,
                client_write_iv,
                client_write_mac_key,
            ),
            cipher::new_decrypter(
                suite,
                self.version,
                server_write_key,
                server_write_iv,
                server_write_mac_key,
            ),
        );

        key_block.zeroize();
        pair
    }

    fn make_key_block(&self) -> Vec<u8> {
        let suite = self.suite;
        let len =
            (suite.mac_key_len() + suite.enc_key_len() + suite.fixed_iv_len(self.version)) * 2;

        let mut out = vec![0u8; len];

        // NOTE: opposite random order to the master secret derivation.
        let randoms = join_randoms(&self.randoms.server, &self.randoms.client);
        prf(
            &mut out,
            self.version,
            &self.master_secret,
            b"key expansion",
            &randoms,
        );

        out
    }

    pub(crate) fn version(&self) -> ProtocolVersion {
        self.version
    }

    fn make_verify_data(&self, handshake_hash: &[u8], label: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 12];

        prf(
            &mut out,
            self.version,
            &self.master_secret,
            label,
            handshake_hash,
        );
        out
    }

    pub(crate) fn client_verify_data(&self, handshake_hash: &[u8]) -> Vec<u8> {
        self.make_verify_data(handshake_hash, b"client finished")
    }

    pub(crate) fn server_verify_data(&self, handshake_hash: &[u8]) -> Vec<u8> {
        self.make_verify_data(handshake_hash, b"server finished")
    }
}

impl Drop for ConnectionSecrets {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}

fn join_randoms(first: &[u8; 32], second: &[u8; 32]) -> [u8; 64] {
    let mut randoms = [0u8; 64];
    randoms[..32].copy_from_slice(first);
    randoms[32..].copy_from_slice(second);
    randoms
}
