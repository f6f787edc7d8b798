// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The KNXnet/IP Secure (TCP) session handshake and the SecureWrapper
//! envelope that carries every frame once a session is established.

use crate::{
    error::KnxIpError,
    knxip::{
        body::{SecureWrapper, SessionAuthenticate, SessionRequest, SessionResponse, SessionStatus},
        hpai::Hpai,
        service::STATUS_AUTHENTICATION_SUCCESS,
        KnxIpFrame,
    },
    secure::crypto::{
        cbc_mac_padded, ctr_xor, derive_device_authentication_key, derive_session_key,
        derive_user_password_key, encrypt_mac_block, xor32, EcdhKeyPair, HANDSHAKE_MAC_COUNTER,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureSessionState {
    AwaitingSessionResponse,
    AwaitingSessionStatus,
    Established,
    Closed,
}

/// Drives a single Secure TCP session: the ECDH handshake, the derived
/// session key, and the strictly monotonic send/receive sequence counters
/// the SecureWrapper envelope requires.
pub struct SecureSession {
    state: SecureSessionState,
    keypair: EcdhKeyPair,
    server_public_key: Option<[u8; 32]>,
    session_id: u16,
    session_key: Option<[u8; 16]>,
    serial: [u8; 6],
    next_send_seq: u64,
    last_accepted_seq: Option<u64>,
}

impl SecureSession {
    pub fn new(client_secret: [u8; 32], serial: [u8; 6]) -> Self {
        Self {
            state: SecureSessionState::AwaitingSessionResponse,
            keypair: EcdhKeyPair::from_bytes(client_secret),
            server_public_key: None,
            session_id: 0,
            session_key: None,
            serial,
            next_send_seq: 0,
            last_accepted_seq: None,
        }
    }

    pub fn state(&self) -> SecureSessionState {
        self.state
    }

    /// Build the initial `SessionRequest`, carrying this session's ephemeral
    /// public key behind a route-back HPAI.
    pub fn build_session_request(&self) -> KnxIpFrame {
        KnxIpFrame::new(crate::knxip::KnxIpBody::SessionRequest(SessionRequest {
            control_endpoint: Hpai::ROUTE_BACK,
            client_public_key: self.keypair.public,
        }))
    }

    /// Verify an incoming `SessionResponse` against the device
    /// authentication password and, on success, derive the session key and
    /// advance to [`SecureSessionState::AwaitingSessionStatus`].
    pub fn accept_session_response(
        &mut self,
        header_bytes: &[u8],
        response: &SessionResponse,
        device_authentication_password: &str,
    ) -> Result<(), KnxIpError> {
        if self.state != SecureSessionState::AwaitingSessionResponse {
            return Err(KnxIpError::SecureValidation("unexpected SessionResponse"));
        }
        let k_dev = derive_device_authentication_key(device_authentication_password);
        let xored = xor32(&self.keypair.public, &response.server_public_key);

        let mut mac_input = Vec::with_capacity(header_bytes.len() + 2 + 32);
        mac_input.extend_from_slice(header_bytes);
        mac_input.extend_from_slice(&response.session_id.to_be_bytes());
        mac_input.extend_from_slice(&xored);

        let expected_mac = cbc_mac_padded(&k_dev, &mac_input);
        let expected_on_wire = encrypt_mac_block(&k_dev, &HANDSHAKE_MAC_COUNTER, expected_mac);

        if expected_on_wire != response.mac {
            return Err(KnxIpError::SecureValidation("SessionResponse MAC mismatch"));
        }

        let shared = self.keypair.shared_secret(&response.server_public_key);
        self.session_key = Some(derive_session_key(&shared));
        self.server_public_key = Some(response.server_public_key);
        self.session_id = response.session_id;
        self.state = SecureSessionState::AwaitingSessionStatus;
        Ok(())
    }

    /// Build the encrypted `SessionAuthenticate` frame, wrapped in a
    /// `SecureWrapper` under the session key, per AN159 §5.4.
    pub fn build_session_authenticate(
        &mut self,
        header_bytes: &[u8],
        user_id: u8,
        user_password: &str,
    ) -> Result<KnxIpFrame, KnxIpError> {
        let server_pub = self
            .server_public_key
            .ok_or(KnxIpError::SecureValidation("session key not yet established"))?;
        let k_user = derive_user_password_key(user_password);
        let xored = xor32(&self.keypair.public, &server_pub);

        let mut mac_input = Vec::with_capacity(header_bytes.len() + 2 + 32);
        mac_input.extend_from_slice(header_bytes);
        mac_input.push(0x00);
        mac_input.push(user_id);
        mac_input.extend_from_slice(&xored);

        let mac = cbc_mac_padded(&k_user, &mac_input);
        let on_wire_mac = encrypt_mac_block(&k_user, &HANDSHAKE_MAC_COUNTER, mac);

        let inner = KnxIpFrame::new(crate::knxip::KnxIpBody::SessionAuthenticate(
            SessionAuthenticate {
                user_id,
                mac: on_wire_mac,
            },
        ));

        self.wrap(&inner.encode())
    }

    /// Inspect a (decrypted) `SessionStatus`; `STATUS_AUTHENTICATION_SUCCESS`
    /// marks the session ready for application traffic.
    pub fn accept_session_status(&mut self, status: &SessionStatus) -> Result<(), KnxIpError> {
        if status.status != STATUS_AUTHENTICATION_SUCCESS {
            self.state = SecureSessionState::Closed;
            return Err(KnxIpError::SecureValidation("session authentication failed"));
        }
        self.state = SecureSessionState::Established;
        Ok(())
    }

    /// Encrypt `plain` (an encoded [`KnxIpFrame`]) into a `SecureWrapper`,
    /// consuming the next strictly monotonic sequence number.
    pub fn wrap(&mut self, plain: &[u8]) -> Result<KnxIpFrame, KnxIpError> {
        let key = self
            .session_key
            .ok_or(KnxIpError::SecureValidation("no session key"))?;

        let seq = self.next_send_seq;
        self.next_send_seq += 1;
        let sequence_info = seq_to_bytes(seq);
        let msg_tag = 0u16;

        let block0 = wrapper_block0(&sequence_info, &self.serial, msg_tag, plain.len() as u16);

        // Associated data is the wrapper's session_id; the 6-byte KNX/IP
        // header is identical on every frame and contributes nothing to
        // distinguish one wrapper's MAC from another's.
        let mut mac_input = Vec::with_capacity(2 + plain.len());
        mac_input.extend_from_slice(&self.session_id.to_be_bytes());
        mac_input.extend_from_slice(plain);
        let mac = cbc_mac_padded(&key, &mac_input);

        let mut encrypted_data = plain.to_vec();
        ctr_xor(&key, &block0, &mut encrypted_data);
        let mac_counter = ctr_counter_for_mac(&sequence_info, &self.serial, msg_tag);
        let mac_bytes = encrypt_mac_block(&key, &mac_counter, mac);

        Ok(KnxIpFrame::new(crate::knxip::KnxIpBody::SecureWrapper(
            SecureWrapper {
                session_id: self.session_id,
                sequence_info,
                serial: self.serial,
                msg_tag: 0,
                encrypted_data,
                mac: mac_bytes,
            },
        )))
    }

    /// Decrypt and verify an incoming `SecureWrapper`, enforcing the
    /// strictly-increasing sequence invariant. Returns the plaintext
    /// `KnxIpFrame` bytes on success.
    pub fn unwrap(&mut self, wrapper: &SecureWrapper) -> Result<Vec<u8>, KnxIpError> {
        let key = self
            .session_key
            .ok_or(KnxIpError::SecureValidation("no session key"))?;

        let seq = seq_from_bytes(&wrapper.sequence_info);
        if let Some(last) = self.last_accepted_seq {
            if seq <= last {
                return Err(KnxIpError::SecureValidation("replayed or out-of-order sequence"));
            }
        }

        let block0 = wrapper_block0(
            &wrapper.sequence_info,
            &wrapper.serial,
            wrapper.msg_tag,
            wrapper.encrypted_data.len() as u16,
        );
        let mut plain = wrapper.encrypted_data.clone();
        ctr_xor(&key, &block0, &mut plain);

        let mac_counter = ctr_counter_for_mac(&wrapper.sequence_info, &wrapper.serial, wrapper.msg_tag);

        let mut mac_input = Vec::with_capacity(2 + plain.len());
        mac_input.extend_from_slice(&wrapper.session_id.to_be_bytes());
        mac_input.extend_from_slice(&plain);
        let expected_mac = cbc_mac_padded(&key, &mac_input);
        let on_wire_expected = encrypt_mac_block(&key, &mac_counter, expected_mac);

        if on_wire_expected != wrapper.mac {
            return Err(KnxIpError::SecureValidation("SecureWrapper MAC mismatch"));
        }

        self.last_accepted_seq = Some(seq);
        Ok(plain)
    }
}

fn seq_to_bytes(seq: u64) -> [u8; 6] {
    let b = seq.to_be_bytes();
    [b[2], b[3], b[4], b[5], b[6], b[7]]
}

fn seq_from_bytes(bytes: &[u8; 6]) -> u64 {
    let mut b = [0u8; 8];
    b[2..].copy_from_slice(bytes);
    u64::from_be_bytes(b)
}

/// `seq(6) || serial(6) || msg_tag(2) || len(2)`: the AES-CTR initial
/// counter block for a SecureWrapper payload.
fn wrapper_block0(sequence_info: &[u8; 6], serial: &[u8; 6], msg_tag: u16, len: u16) -> [u8; 16] {
    let mut b = [0u8; 16];
    b[0..6].copy_from_slice(sequence_info);
    b[6..12].copy_from_slice(serial);
    b[12..14].copy_from_slice(&msg_tag.to_be_bytes());
    b[14..16].copy_from_slice(&len.to_be_bytes());
    b
}

/// `seq || serial || msg_tag || 0xFF 0x00`: the counter block used to
/// encrypt/decrypt the trailing MAC.
fn ctr_counter_for_mac(sequence_info: &[u8; 6], serial: &[u8; 6], msg_tag: u16) -> [u8; 16] {
    let mut b = [0u8; 16];
    b[0..6].copy_from_slice(sequence_info);
    b[6..12].copy_from_slice(serial);
    b[12..14].copy_from_slice(&msg_tag.to_be_bytes());
    b[14] = 0xFF;
    b[15] = 0x00;
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_round_trips_between_two_sessions() {
        let mut sender = SecureSession::new([7u8; 32], [0, 0, 0, 0, 0, 1]);
        let mut receiver = SecureSession::new([9u8; 32], [0, 0, 0, 0, 0, 2]);

        let shared_key = [0x55u8; 16];
        sender.session_key = Some(shared_key);
        sender.session_id = 42;
        receiver.session_key = Some(shared_key);
        receiver.session_id = 42;

        let plain = b"hello knx secure".to_vec();
        let wrapped = sender.wrap(&plain).expect("wrap");
        let crate::knxip::KnxIpBody::SecureWrapper(w) = wrapped.body else {
            panic!("expected SecureWrapper");
        };

        let unwrapped = receiver.unwrap(&w).expect("unwrap");
        assert_eq!(unwrapped, plain);
    }

    #[test]
    fn session_authenticate_mac_matches_an159v06_worked_example() {
        // Client/server ECDH key pair and user_password="secret" from the
        // AN159v06 worked example; expected MAC
        // `1F 1D 59 EA 9F 12 A1 52 E5 D9 72 7F 08 46 2C DE`.
        const CLIENT_SECRET: [u8; 32] = [
            0xb8, 0xfa, 0xbd, 0x62, 0x66, 0x5d, 0x8b, 0x9e, 0x8a, 0x9d, 0x8b, 0x1f, 0x4b, 0xca,
            0x42, 0xc8, 0xc2, 0x78, 0x9a, 0x61, 0x10, 0xf5, 0x0e, 0x9d, 0xd7, 0x85, 0xb3, 0xed,
            0xe8, 0x83, 0xf3, 0x78,
        ];
        const SERVER_PUBLIC_KEY: [u8; 32] = [
            0xbd, 0xf0, 0x99, 0x90, 0x99, 0x23, 0x14, 0x3e, 0xf0, 0xa5, 0xde, 0x0b, 0x3b, 0xe3,
            0x68, 0x7b, 0xc5, 0xbd, 0x3c, 0xf5, 0xf9, 0xe6, 0xf9, 0x01, 0x69, 0x9c, 0xd8, 0x70,
            0xec, 0x1f, 0xf8, 0x24,
        ];
        const EXPECTED_MAC: [u8; 16] = [
            0x1F, 0x1D, 0x59, 0xEA, 0x9F, 0x12, 0xA1, 0x52, 0xE5, 0xD9, 0x72, 0x7F, 0x08, 0x46,
            0x2C, 0xDE,
        ];

        let mut session = SecureSession::new(CLIENT_SECRET, [0, 0, 0, 0, 0, 1]);
        session.server_public_key = Some(SERVER_PUBLIC_KEY);
        session.session_key = Some([0x42u8; 16]);
        session.session_id = 1;

        let header_bytes = [0x06, 0x10, 0x09, 0x53, 0x00, 0x18];
        let user_id = 1u8;
        let wrapped = session
            .build_session_authenticate(&header_bytes, user_id, "secret")
            .expect("build_session_authenticate");

        let crate::knxip::KnxIpBody::SecureWrapper(wrapper) = wrapped.body else {
            panic!("expected SecureWrapper");
        };
        let plain = {
            let mut receiver = SecureSession::new([9u8; 32], wrapper.serial);
            receiver.session_key = session.session_key;
            receiver.session_id = session.session_id;
            receiver.unwrap(&wrapper).expect("unwrap")
        };
        let inner = KnxIpFrame::decode(&plain).expect("decode inner frame");
        let crate::knxip::KnxIpBody::SessionAuthenticate(auth) = inner.body else {
            panic!("expected SessionAuthenticate");
        };
        assert_eq!(auth.user_id, user_id);
        assert_eq!(auth.mac, EXPECTED_MAC);
    }

    #[test]
    fn unwrap_rejects_replayed_sequence() {
        let mut sender = SecureSession::new([1u8; 32], [0; 6]);
        let mut receiver = SecureSession::new([2u8; 32], [0; 6]);
        let key = [0x11u8; 16];
        sender.session_key = Some(key);
        receiver.session_key = Some(key);

        let crate::knxip::KnxIpBody::SecureWrapper(w1) =
            sender.wrap(b"first").expect("wrap").body
        else {
            unreachable!()
        };
        receiver.unwrap(&w1).expect("first accepted");

        // Replaying the same wrapper must be rejected.
        assert!(receiver.unwrap(&w1).is_err());
    }
}
