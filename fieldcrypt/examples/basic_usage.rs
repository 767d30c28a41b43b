//! Basic usage example for `FieldCrypt`.

use fieldcrypt::prelude::*;
use fieldcrypt_derive::Encryptable;
use fieldcrypt_key_file::FileKeyStore;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Serialize, Deserialize, Encryptable)]
struct Address {
    city: String,
    #[crypt(annotation = "aes256,user-enc,user-mac")]
    street: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Encryptable)]
struct User {
    name: String,
    #[crypt(annotation = "aes256,user-enc,user-mac")]
    email: String,
    #[crypt(annotation = "aes256,user-enc,user-mac")]
    age: u32,
    #[crypt(nested)]
    address: Address,
}

fn init_keys(key_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(key_dir)?;
    for id in ["user-enc", "user-mac"] {
        let mut key = vec![0u8; 32];
        OsRng.fill_bytes(&mut key);
        std::fs::write(key_dir.join(format!("{id}.key")), key)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("FieldCrypt Basic Usage Example");
    println!("==============================\n");

    let key_dir = PathBuf::from("./example_keys");

    // Initialize the key directory if it doesn't exist
    if !key_dir.exists() {
        println!("Initializing key directory at {}...", key_dir.display());
        init_keys(&key_dir)?;
        println!("✓ Key directory initialized\n");
    }

    let store = FileKeyStore::new(&key_dir)?;
    println!("✓ FileKeyStore created\n");

    let user = User {
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
        age: 34,
        address: Address { city: "Berlin".to_string(), street: "Unter den Linden 1".to_string() },
    };
    println!("Plaintext: {}\n", serde_json::to_string_pretty(&user)?);

    let encrypted = encrypt_struct(&user, &store)?;
    let document: serde_json::Value = serde_json::from_slice(&encrypted)?;
    println!("Encrypted: {}\n", serde_json::to_string_pretty(&document)?);

    let decrypted: User = decrypt_struct(&encrypted, &store)?;
    assert_eq!(decrypted, user);
    println!("✓ Decrypted document matches the original\n");

    // Annotations that cannot be resolved fail the whole document
    let shape = Shape::new(vec![FieldDescriptor::annotated("email", "aes256,missing-key,user-mac")]);
    match Transformer::new().encrypt_document(br#"{"email":"bob@example.com"}"#, &shape, &store) {
        Ok(_) => println!("unexpected success"),
        Err(e) => println!("✓ Expected failure ({:?}): {e}", e.kind()),
    }

    Ok(())
}
