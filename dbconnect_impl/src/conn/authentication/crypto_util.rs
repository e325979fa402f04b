use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use sha2::{Digest, Sha256};

pub(crate) fn pbkdf2_sha256(key: &[u8], salt: &[u8], iterations: u32) -> Result<Vec<u8>, String> {
    let mut output = [0_u8; 32];
    pbkdf2::<Hmac<Sha256>>(key, salt, iterations, &mut output)
        .map_err(|_| "invalid key length".to_string())?;
    Ok(output.to_vec())
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).map_err(|_| "invalid key length".to_string())?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn sha256(input: &[u8]) -> Vec<u8> {
    let mut sha = Sha256::new();
    sha.update(input);
    sha.finalize().to_vec()
}

pub(crate) fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>, String> {
    if a.len() != b.len() {
        return Err("xor needs two equally long operands".to_string());
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}
