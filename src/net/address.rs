//! Host address validation.

use crate::error::{DetlinkError, Result};

/// Check that `host` is four dot-separated integers in 0..=255.
pub fn validate_host(host: &str) -> Result<()> {
    if host.trim().is_empty() {
        return Err(DetlinkError::Validation("host is empty".into()));
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() != 4 {
        return Err(DetlinkError::Validation(format!(
            "Invalid IP address format: {} (expected 4 octets, got {})",
            host,
            parts.len()
        )));
    }

    for part in parts {
        if part.parse::<u8>().is_err() {
            return Err(DetlinkError::Validation(format!(
                "Invalid IP address format: {} (bad octet '{}')",
                host, part
            )));
        }
    }

    Ok(())
}

/// Returns true if `host` passes [`validate_host`].
pub fn is_valid_host(host: &str) -> bool {
    validate_host(host).is_ok()
}
