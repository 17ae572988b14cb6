use aes::Aes128;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::MeshError;
use crate::packet::Packet;

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Serializes packets to JSON, encrypts with AES-128-CBC/PKCS7 under a fixed
/// 16-byte key, and base64-encodes the IV-prefixed ciphertext for the wire.
/// Grounded on `offline_mesh_app/utils/encryption.py::encrypt_data`/`decrypt_data`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    key: [u8; 16],
}

impl FrameCodec {
    pub fn new(key: [u8; 16]) -> Self {
        FrameCodec { key }
    }

    pub fn encode(&self, packet: &Packet) -> Result<Vec<u8>, MeshError> {
        let plaintext = serde_json::to_vec(packet)?;
        Ok(self.encrypt(&plaintext))
    }

    pub fn decode(&self, frame: &[u8]) -> Result<Packet, MeshError> {
        let plaintext = self.decrypt(frame)?;
        let packet = serde_json::from_slice(&plaintext)?;
        Ok(packet)
    }

    /// Encrypts and base64-encodes arbitrary bytes (used for the raw payload
    /// of `file_chunk.data`, not just whole packets).
    pub fn encrypt_bytes(&self, data: &[u8]) -> Vec<u8> {
        self.encrypt(data)
    }

    pub fn decrypt_bytes(&self, data: &[u8]) -> Result<Vec<u8>, MeshError> {
        self.decrypt(data)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);

        let encryptor = Encryptor::new_from_slices(&self.key, &iv).expect("key and IV are fixed 16 bytes");
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut combined = Vec::with_capacity(16 + ciphertext.len());
        combined.extend_from_slice(&iv);
        combined.extend_from_slice(&ciphertext);
        BASE64.encode(combined).into_bytes()
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, MeshError> {
        let raw = BASE64
            .decode(data)
            .map_err(|e| MeshError::MalformedFrame(format!("bad base64: {e}")))?;
        if raw.len() < 16 {
            return Err(MeshError::MalformedFrame("frame shorter than IV".into()));
        }
        let (iv, ciphertext) = raw.split_at(16);

        let decryptor = Decryptor::new_from_slices(&self.key, iv).expect("key and IV are fixed 16 bytes");
        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| MeshError::MalformedFrame(format!("decrypt failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::broadcast_packet;
    use std::net::Ipv4Addr;

    fn codec() -> FrameCodec {
        FrameCodec::new(*b"ThisIsA16ByteKey")
    }

    #[test]
    fn round_trips_a_packet() {
        let codec = codec();
        let packet = broadcast_packet(
            "aaaaaaaa".into(),
            Ipv4Addr::new(192, 168, 1, 5),
            "hello".into(),
            "broadcast".into(),
        );
        let frame = codec.encode(&packet).unwrap();
        let decoded = codec.decode(&frame).unwrap();
        assert_eq!(decoded.id(), packet.id());
    }

    #[test]
    fn each_encryption_uses_a_fresh_iv() {
        let codec = codec();
        let a = codec.encrypt_bytes(b"same plaintext");
        let b = codec.encrypt_bytes(b"same plaintext");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_truncated_frames() {
        let codec = codec();
        let err = codec.decrypt_bytes(b"dG9vc2hvcnQ=").unwrap_err();
        assert!(matches!(err, MeshError::MalformedFrame(_)));
    }
}
