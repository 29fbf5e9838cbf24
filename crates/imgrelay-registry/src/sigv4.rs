//! AWS Signature Version 4 for the ECR JSON API, via `aws-sigv4`.

use crate::aws::AwsCredentials;
use crate::RegistryError;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningParams, SigningSettings};
use aws_sigv4::sign::v4;
use std::time::SystemTime;

/// Who signs, where, and when.
pub struct SigningScope<'a> {
    pub credentials: &'a AwsCredentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: SystemTime,
}

/// Sign a request and return the headers to add to it: `x-amz-date`,
/// `x-amz-security-token` when a session token is in use, and
/// `authorization`. Every header in `headers` is signed.
pub fn signed_headers(
    scope: &SigningScope<'_>,
    method: &str,
    url: &str,
    headers: &[(&str, &str)],
    payload: &[u8],
) -> Result<Vec<(String, String)>, RegistryError> {
    let identity = scope.credentials.inner().clone().into();
    let params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(scope.region)
        .name(scope.service)
        .time(scope.time)
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| RegistryError::Config(format!("invalid signing parameters: {e}")))?
        .into();

    let request = SignableRequest::new(
        method,
        url,
        headers.iter().copied(),
        SignableBody::Bytes(payload),
    )
    .map_err(|e| RegistryError::Config(format!("cannot sign request to {url}: {e}")))?;
    let (instructions, _signature) = sign(request, &params)
        .map_err(|e| RegistryError::Config(format!("cannot sign request to {url}: {e}")))?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const URL: &str = "https://api.ecr.us-east-1.amazonaws.com/";

    fn scope<'a>(credentials: &'a AwsCredentials, region: &'a str) -> SigningScope<'a> {
        SigningScope {
            credentials,
            region,
            service: "ecr",
            time: Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap().into(),
        }
    }

    fn header<'a>(out: &'a [(String, String)], name: &str) -> Option<&'a str> {
        out.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn authorization_header_shape() {
        let creds = AwsCredentials::new("AKIDEXAMPLE", "secret");
        let headers = [
            ("x-amz-target", "AmazonEC2ContainerRegistry_V20150921.ListImages"),
            ("content-type", "application/x-amz-json-1.1"),
        ];
        let out = signed_headers(&scope(&creds, "us-east-1"), "POST", URL, &headers, b"{}").unwrap();

        assert_eq!(header(&out, "x-amz-date"), Some("20240517T093000Z"));
        let auth = header(&out, "authorization").unwrap();
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240517/us-east-1/ecr/aws4_request, "
        ));
        assert!(auth.contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target, "));
        let signature = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(header(&out, "x-amz-security-token").is_none());
    }

    #[test]
    fn signature_is_deterministic_and_payload_sensitive() {
        let creds = AwsCredentials::new("AKIDEXAMPLE", "secret");
        let headers = [("content-type", "application/x-amz-json-1.1")];
        let sign_body = |body: &[u8]| {
            let out =
                signed_headers(&scope(&creds, "eu-west-1"), "POST", URL, &headers, body).unwrap();
            header(&out, "authorization").unwrap().to_owned()
        };
        assert_eq!(sign_body(b"{\"a\":1}"), sign_body(b"{\"a\":1}"));
        assert_ne!(sign_body(b"{\"a\":1}"), sign_body(b"{\"a\":2}"));
    }

    #[test]
    fn session_token_is_emitted() {
        let creds = AwsCredentials::new("AKIDEXAMPLE", "secret").with_session_token("tok123");
        let out = signed_headers(&scope(&creds, "us-east-1"), "POST", URL, &[], b"").unwrap();
        assert_eq!(header(&out, "x-amz-security-token"), Some("tok123"));
        assert!(header(&out, "authorization")
            .unwrap()
            .contains("x-amz-security-token"));
    }
}
