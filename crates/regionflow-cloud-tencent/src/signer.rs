//! TC3-HMAC-SHA256 request signing
//!
//! Signs the JSON POST style of the API: only `content-type` and `host` are
//! signed headers and the query string is always empty.

use crate::credentials::Credentials;
use crate::error::{Result, TencentError};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "TC3-HMAC-SHA256";
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host";
const TERMINATOR: &str = "tc3_request";

/// Build the `Authorization` header value for one request
pub fn authorization(
    credentials: &Credentials,
    service: &str,
    host: &str,
    payload: &str,
    timestamp: i64,
) -> Result<String> {
    let date = chrono::DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| TencentError::Signing(format!("timestamp {} out of range", timestamp)))?
        .format("%Y-%m-%d")
        .to_string();

    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\n{}\n{}",
        CONTENT_TYPE,
        host,
        SIGNED_HEADERS,
        sha256_hex(payload.as_bytes())
    );

    let scope = format!("{}/{}/{}", date, service, TERMINATOR);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        timestamp,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let secret_date = hmac_sha256(format!("TC3{}", credentials.secret_key).as_bytes(), &date)?;
    let secret_service = hmac_sha256(&secret_date, service)?;
    let secret_signing = hmac_sha256(&secret_service, TERMINATOR)?;
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign)?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.secret_id, scope, SIGNED_HEADERS, signature
    ))
}

fn hmac_sha256(key: &[u8], message: &str) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| TencentError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESTAMP: i64 = 1551113065;

    fn credentials() -> Credentials {
        Credentials::new("AKIDexample", "secret-key")
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_authorization_layout() {
        let header = authorization(
            &credentials(),
            "cfs",
            "cfs.tencentcloudapi.com",
            r#"{"FileSystemId":"cfs-1"}"#,
            TIMESTAMP,
        )
        .unwrap();

        let prefix = "TC3-HMAC-SHA256 Credential=AKIDexample/2019-02-25/cfs/tc3_request, \
                      SignedHeaders=content-type;host, Signature=";
        assert!(header.starts_with(prefix), "{}", header);

        let signature = &header[prefix.len()..];
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_covers_payload_host_and_key() {
        let sign = |key: &str, host: &str, payload: &str| {
            authorization(
                &Credentials::new("AKIDexample", key),
                "cfs",
                host,
                payload,
                TIMESTAMP,
            )
            .unwrap()
        };

        let base = sign("k", "cfs.tencentcloudapi.com", "{}");
        assert_eq!(base, sign("k", "cfs.tencentcloudapi.com", "{}"));
        assert_ne!(base, sign("k", "cfs.tencentcloudapi.com", r#"{"Limit":1}"#));
        assert_ne!(base, sign("k", "cfs.internal.tencentcloudapi.com", "{}"));
        assert_ne!(base, sign("other", "cfs.tencentcloudapi.com", "{}"));
    }
}
