//! The SCRAM-SHA-256 client exchange (RFC 5802/7677) without channel binding.

use crate::conn::authentication::crypto_util;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;

pub(crate) struct ScramSha256 {
    // PostgreSQL leaves this empty; the server takes the user from the
    // startup packet.
    username: String,
    client_nonce: String,
    server_signature: Option<Vec<u8>>,
}

impl ScramSha256 {
    pub(crate) const MECHANISM: &'static str = "SCRAM-SHA-256";

    pub(crate) fn new() -> Self {
        let mut nonce_bytes = [0_u8; 18];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        Self {
            username: String::new(),
            client_nonce: BASE64.encode(nonce_bytes),
            server_signature: None,
        }
    }

    pub(crate) fn initial_response(&self) -> Vec<u8> {
        format!("n,,{}", self.client_first_bare()).into_bytes()
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", self.username, self.client_nonce)
    }

    /// Processes the server-first message and produces the client-final
    /// message carrying the proof.
    pub(crate) fn continue_exchange(
        &mut self,
        server_first: &[u8],
        password: &str,
    ) -> Result<Vec<u8>, String> {
        let server_first = std::str::from_utf8(server_first)
            .map_err(|_| "server-first message is not UTF-8".to_string())?
            .to_string();
        let (server_nonce, salt, iterations) = parse_server_first(&server_first)?;
        if !server_nonce.starts_with(self.client_nonce.as_str()) {
            return Err("server nonce does not extend the client nonce".to_string());
        }
        if iterations < 4096 {
            return Err(format!("not enough iterations: {iterations}"));
        }

        let salted_password = crypto_util::pbkdf2_sha256(password.as_bytes(), &salt, iterations)?;
        let client_key = crypto_util::hmac_sha256(&salted_password, b"Client Key")?;
        let stored_key = crypto_util::sha256(&client_key);

        // "biws" is the base64 form of the gs2 header "n,,"
        let client_final_without_proof = format!("c=biws,r={server_nonce}");
        let auth_message = format!(
            "{},{server_first},{client_final_without_proof}",
            self.client_first_bare()
        );

        let client_signature = crypto_util::hmac_sha256(&stored_key, auth_message.as_bytes())?;
        let client_proof = crypto_util::xor(&client_key, &client_signature)?;

        let server_key = crypto_util::hmac_sha256(&salted_password, b"Server Key")?;
        self.server_signature =
            Some(crypto_util::hmac_sha256(&server_key, auth_message.as_bytes())?);

        Ok(format!(
            "{client_final_without_proof},p={}",
            BASE64.encode(client_proof)
        )
        .into_bytes())
    }

    /// Checks the server's signature from the server-final message.
    pub(crate) fn verify_final(&self, server_final: &[u8]) -> Result<(), String> {
        let server_final = std::str::from_utf8(server_final)
            .map_err(|_| "server-final message is not UTF-8".to_string())?;
        let signature = server_final
            .split(',')
            .find_map(|field| field.strip_prefix("v="))
            .ok_or_else(|| "server-final message lacks a signature".to_string())?;
        let signature = BASE64
            .decode(signature)
            .map_err(|_| "invalid base64 in server signature".to_string())?;
        match self.server_signature {
            Some(ref expected) if *expected == signature => Ok(()),
            _ => Err(
                "server signature mismatch - this indicates a severe security issue \
                 with the server's identity"
                    .to_string(),
            ),
        }
    }
}

fn parse_server_first(server_first: &str) -> Result<(String, Vec<u8>, u32), String> {
    let mut nonce = None;
    let mut salt = None;
    let mut iterations = None;
    for field in server_first.split(',') {
        if let Some(r) = field.strip_prefix("r=") {
            nonce = Some(r.to_string());
        } else if let Some(s) = field.strip_prefix("s=") {
            salt = Some(
                BASE64
                    .decode(s)
                    .map_err(|_| "invalid base64 in salt".to_string())?,
            );
        } else if let Some(i) = field.strip_prefix("i=") {
            iterations = Some(
                i.parse()
                    .map_err(|_| "invalid iteration count".to_string())?,
            );
        }
    }
    match (nonce, salt, iterations) {
        (Some(nonce), Some(salt), Some(iterations)) => Ok((nonce, salt, iterations)),
        _ => Err("incomplete server-first message".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The RFC 7677 example exchange, with the client nonce pinned.
    #[test]
    fn reproduces_the_rfc_7677_exchange() {
        let mut scram = ScramSha256 {
            username: "user".to_string(),
            client_nonce: "rOprNGfwEbeRWgbNEkqO".to_string(),
            server_signature: None,
        };
        assert_eq!(
            scram.initial_response(),
            b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO".to_vec()
        );
        let server_first = b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
        let client_final = scram
            .continue_exchange(server_first, "pencil")
            .unwrap();
        assert_eq!(
            String::from_utf8(client_final).unwrap(),
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );
        scram
            .verify_final(b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=")
            .unwrap();
        assert!(scram.verify_final(b"v=AAAA").is_err());
    }

    #[test]
    fn rejects_a_nonce_that_does_not_extend_ours() {
        let mut scram = ScramSha256 {
            username: String::new(),
            client_nonce: "abc".to_string(),
            server_signature: None,
        };
        let err = scram
            .continue_exchange(b"r=xyz,s=AAAA,i=4096", "pw")
            .unwrap_err();
        assert!(err.contains("nonce"));
    }
}
