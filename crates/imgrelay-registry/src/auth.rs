use crate::{RegistryControl, RegistryError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use imgrelay_schema::TransferCredential;
use secrecy::SecretString;

/// Obtain a short-lived credential for pulling from or pushing to the
/// registry behind `control`.
///
/// The registry issues `base64(principal:secret)`; a token that does not
/// decode to that shape is treated as an authentication failure.
pub fn get_credential(control: &dyn RegistryControl) -> Result<TransferCredential, RegistryError> {
    let endpoint = control.endpoint();
    let data = control.get_authorization_token()?;

    let decoded = STANDARD
        .decode(data.token.trim())
        .map_err(|e| RegistryError::Auth(format!("malformed token from {endpoint}: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| RegistryError::Auth(format!("token from {endpoint} is not UTF-8")))?;
    let (principal, secret) = decoded.split_once(':').ok_or_else(|| {
        RegistryError::Auth(format!("token from {endpoint} has no principal separator"))
    })?;
    if principal.is_empty() {
        return Err(RegistryError::Auth(format!(
            "token from {endpoint} has an empty principal"
        )));
    }

    let registry = data
        .proxy_endpoint
        .strip_prefix("https://")
        .or_else(|| data.proxy_endpoint.strip_prefix("http://"))
        .unwrap_or(&data.proxy_endpoint)
        .trim_end_matches('/')
        .to_owned();

    tracing::debug!("issued credential for {registry} ({endpoint})");
    Ok(TransferCredential {
        principal: principal.to_owned(),
        secret: SecretString::from(secret.to_owned()),
        registry,
        expires_at: data.expires_at,
    })
}
