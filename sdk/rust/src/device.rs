//! Device fingerprint generation

use sha2::{Digest, Sha256};

use crate::error::{Result, SdkError, SdkErrorCode};

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a stable fingerprint for the machine this POS runs on.
///
/// Platform-specific implementation:
/// - Linux: `/etc/machine-id`
/// - macOS: IOPlatformSerialNumber from IOKit
///
/// The raw identifier is hashed before returning so actual hardware IDs
/// never leave the device.
pub fn machine_fingerprint() -> Result<String> {
    let raw_id = get_raw_machine_id()?;
    let digest = Sha256::digest(raw_id.as_bytes());
    Ok(format!("pos-{}", &hex::encode(digest)[..16]))
}

#[cfg(target_os = "linux")]
fn get_raw_machine_id() -> Result<String> {
    // Try /etc/machine-id first (systemd)
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    // Fallback to /var/lib/dbus/machine-id
    if let Ok(id) = std::fs::read_to_string("/var/lib/dbus/machine-id") {
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    Err(SdkError::new(
        SdkErrorCode::Validation,
        "Could not determine machine ID; a stored random fingerprint will be used instead.",
    ))
}

#[cfg(target_os = "macos")]
fn get_raw_machine_id() -> Result<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .map_err(|_| SdkError::new(SdkErrorCode::Validation, "Failed to run ioreg command"))?;

    let output_str = String::from_utf8_lossy(&output.stdout);

    for key in ["IOPlatformSerialNumber", "IOPlatformUUID"] {
        for line in output_str.lines() {
            if line.contains(key) {
                // Line format: "IOPlatformSerialNumber" = "XXXXX"
                if let Some(start) = line.rfind('"') {
                    if let Some(end) = line[..start].rfind('"') {
                        let value = &line[end + 1..start];
                        if !value.is_empty() {
                            return Ok(value.to_string());
                        }
                    }
                }
            }
        }
    }

    Err(SdkError::new(
        SdkErrorCode::Validation,
        "Could not determine machine ID; a stored random fingerprint will be used instead.",
    ))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn get_raw_machine_id() -> Result<String> {
    Err(SdkError::new(
        SdkErrorCode::Validation,
        "Machine ID not supported on this platform; a stored random fingerprint will be used.",
    ))
}
