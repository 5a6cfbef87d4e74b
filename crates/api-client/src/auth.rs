use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Signs a fully serialized query string with the account's API secret.
///
/// Private endpoints require the HMAC-SHA256 of the exact query string,
/// timestamp included, appended as a hex `signature` parameter. The query
/// must not be reordered after signing or the exchange rejects the request.
pub fn sign_request(secret: &str, query_string: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(query_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
