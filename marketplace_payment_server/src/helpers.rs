use hmac::{Hmac, Mac};
use sha2::Sha256;

/// HMAC-SHA256 over `data`, returned as lowercase hex. Capture confirmations carry this signature in the
/// webhook signature header.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(data);
    let result = mac.finalize().into_bytes();
    result.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
