use super::encryption::*;
use super::key_exchange::{AES_IV_SIZE, AES_KEY_SIZE};
use proptest::prelude::*;

const KEY: [u8; AES_KEY_SIZE] = [0x42; AES_KEY_SIZE];
const IV: [u8; AES_IV_SIZE] = [0x24; AES_IV_SIZE];

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let mut encryptor = RaopEncryptor::new(KEY, IV).unwrap();
    let mut decryptor = RaopDecryptor::new(KEY, IV).unwrap();

    let original = vec![0xAA; 4096];
    let mut data = original.clone();

    assert_eq!(encryptor.encrypt_in_place(&mut data), 4096);
    assert_ne!(data, original);

    decryptor.decrypt_in_place(&mut data);
    assert_eq!(data, original);
}

#[test]
fn test_vector_starts_at_iv() {
    let encryptor = RaopEncryptor::new(KEY, IV).unwrap();
    assert_eq!(encryptor.vector(), IV);
}

#[test]
fn test_trailing_partial_block_plaintext() {
    let mut encryptor = RaopEncryptor::new(KEY, IV).unwrap();
    let mut data = vec![0x11u8; 37];

    assert_eq!(encryptor.encrypt_in_place(&mut data), 32);
    assert_eq!(&data[32..], &[0x11; 5]);
    assert_eq!(encryptor.vector()[..], data[16..32]);
}

#[test]
fn test_zero_pad_policy_grows_payload() {
    let mut encryptor = RaopEncryptor::new(KEY, IV)
        .unwrap()
        .with_partial_block_policy(PartialBlockPolicy::ZeroPadEncrypt);
    let mut data = vec![0x11u8; 37];

    assert_eq!(encryptor.seal(&mut data), 48);
    assert_eq!(data.len(), 48);

    let mut decryptor = RaopDecryptor::new(KEY, IV).unwrap();
    decryptor.decrypt_in_place(&mut data);
    assert_eq!(&data[..37], &[0x11; 37][..]);
    assert_eq!(&data[37..], &[0; 11][..]);
}

#[test]
fn test_plaintext_policy_keeps_length() {
    let mut encryptor = RaopEncryptor::new(KEY, IV).unwrap();
    let mut data = vec![0x11u8; 37];

    assert_eq!(encryptor.seal(&mut data), 32);
    assert_eq!(data.len(), 37);
}

#[test]
fn test_chaining_continues_across_packets() {
    let mut split = RaopEncryptor::new(KEY, IV).unwrap();
    let mut joined = RaopEncryptor::new(KEY, IV).unwrap();

    let mut first = vec![1u8; 64];
    let mut second = vec![2u8; 48];
    split.encrypt_in_place(&mut first);
    split.encrypt_in_place(&mut second);

    let mut both = [vec![1u8; 64], vec![2u8; 48]].concat();
    joined.encrypt_in_place(&mut both);

    assert_eq!([first, second].concat(), both);
    assert_eq!(split.vector(), joined.vector());
}

#[test]
fn test_reset_policy_repeats_ciphertext() {
    let mut encryptor = RaopEncryptor::new(KEY, IV)
        .unwrap()
        .with_iv_policy(IvPolicy::ResetPerPacket);

    let mut a = vec![7u8; 32];
    let mut b = vec![7u8; 32];
    encryptor.encrypt_in_place(&mut a);
    encryptor.encrypt_in_place(&mut b);

    assert_eq!(a, b);
}

#[test]
fn test_reset_policy_roundtrip() {
    let mut encryptor = RaopEncryptor::new(KEY, IV)
        .unwrap()
        .with_iv_policy(IvPolicy::ResetPerPacket);
    let mut decryptor = RaopDecryptor::new(KEY, IV)
        .unwrap()
        .with_iv_policy(IvPolicy::ResetPerPacket);

    for fill in 0..3u8 {
        let original = vec![fill; 64];
        let mut data = original.clone();
        encryptor.encrypt_in_place(&mut data);
        decryptor.decrypt_in_place(&mut data);
        assert_eq!(data, original);
    }
}

#[test]
fn test_reset_policy_matches_fresh_chain() {
    use crate::protocol::crypto::Aes128CbcEnc;

    let mut encryptor = RaopEncryptor::new(KEY, IV)
        .unwrap()
        .with_iv_policy(IvPolicy::ResetPerPacket);
    let mut warmup = vec![3u8; 48];
    encryptor.encrypt_in_place(&mut warmup);

    let mut data = vec![9u8; 40];
    encryptor.encrypt_in_place(&mut data);

    let mut expected = vec![9u8; 40];
    Aes128CbcEnc::from_parts(&KEY, &IV).encrypt_blocks(&mut expected);
    assert_eq!(data, expected);
    assert_eq!(encryptor.vector()[..], expected[16..32]);
}

proptest! {
    #[test]
    fn prop_rolling_vector_matches_concatenation(
        a in proptest::collection::vec(any::<u8>(), 0..8usize).prop_map(|v| v.repeat(16)),
        b in proptest::collection::vec(any::<u8>(), 0..8usize).prop_map(|v| v.repeat(16)),
    ) {
        let mut split = RaopEncryptor::new(KEY, IV).unwrap();
        let mut joined = RaopEncryptor::new(KEY, IV).unwrap();

        let mut first = a.clone();
        let mut second = b.clone();
        split.encrypt_in_place(&mut first);
        split.encrypt_in_place(&mut second);

        let mut both = [a, b].concat();
        joined.encrypt_in_place(&mut both);

        prop_assert_eq!(split.vector(), joined.vector());
        prop_assert_eq!([first, second].concat(), both);
    }

    #[test]
    fn prop_block_aligned_roundtrip(blocks in proptest::collection::vec(any::<[u8; 16]>(), 1..32)) {
        let original: Vec<u8> = blocks.concat();
        let mut data = original.clone();

        let mut encryptor = RaopEncryptor::new(KEY, IV).unwrap();
        let mut decryptor = RaopDecryptor::new(KEY, IV).unwrap();
        encryptor.encrypt_in_place(&mut data);
        decryptor.decrypt_in_place(&mut data);

        prop_assert_eq!(data, original);
    }
}
