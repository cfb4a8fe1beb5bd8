// Path: crates/crypto/src/sign/eddsa/tests/mod.rs
use super::*;

#[test]
fn keypair_signs_and_verifies() {
    let keypair = Ed25519KeyPair::generate().unwrap();
    let message = b"location commitment body";

    let signature = keypair.sign(message).unwrap();
    let public_key = keypair.public_key();
    assert!(public_key.verify(message, &signature).is_ok());
}

#[test]
fn verification_rejects_a_tampered_message() {
    let keypair = Ed25519KeyPair::generate().unwrap();
    let signature = keypair.sign(b"original").unwrap();
    let public_key = keypair.public_key();
    assert!(public_key.verify(b"tampered", &signature).is_err());
}

#[test]
fn seed_roundtrip_reproduces_the_did() {
    let keypair = Ed25519KeyPair::generate().unwrap();
    let seed: [u8; 32] = keypair.private_key().to_bytes().try_into().unwrap();

    let restored = Ed25519KeyPair::from_seed(&seed).unwrap();
    assert_eq!(keypair.did().unwrap(), restored.did().unwrap());
    assert_eq!(
        keypair.public_key().to_bytes(),
        restored.public_key().to_bytes()
    );
}

#[test]
fn did_signature_verification_is_self_contained() {
    let keypair = Ed25519KeyPair::generate().unwrap();
    let did = keypair.did().unwrap();
    let message = b"signed by did";
    let signature = keypair.sign(message).unwrap();

    assert!(verify_did_signature(&did, message, &signature.to_bytes()).is_ok());

    let other = Ed25519KeyPair::generate().unwrap().did().unwrap();
    assert!(verify_did_signature(&other, message, &signature.to_bytes()).is_err());
}
