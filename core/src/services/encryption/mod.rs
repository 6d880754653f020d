//! Encryption of codes at rest

pub mod code_cipher;

pub use code_cipher::{AesGcmCodeEncryption, CodeEncryption};
