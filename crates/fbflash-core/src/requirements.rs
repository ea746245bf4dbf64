//! Device requirements manifest checking.
//!
//! The manifest (`android-info.txt` in factory archives) lists identifiers
//! the device must report before flashing proceeds:
//!
//! ```text
//! require board=raven
//! require version-bootloader=slider-1.2-8739948
//! require partition-exists=product
//! ```
//!
//! Values may offer alternatives separated by `|`; matching any one
//! satisfies the line.

use tracing::{debug, info};

use crate::error::FlashError;
use crate::transport::FastbootSession;

/// Check every `require` line of `manifest` against the device.
pub fn check_requirements<S: FastbootSession>(
    manifest: &str,
    session: &mut S,
) -> Result<(), FlashError> {
    for (idx, raw) in manifest.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let requirement = line.strip_prefix("require ").ok_or_else(|| failed(
            format!("unrecognized requirement line {}: {line:?}", idx + 1),
        ))?;
        let (key, values) = requirement.split_once('=').ok_or_else(|| failed(
            format!("requirement line {} has no value: {line:?}", idx + 1),
        ))?;
        let accepted: Vec<&str> = values.split('|').collect();

        match key {
            "partition-exists" => {
                for partition in &accepted {
                    let var = format!("partition-type:{partition}");
                    if session.get_var(&var)?.is_none() {
                        return Err(failed(format!("device has no partition {partition:?}")));
                    }
                    debug!(partition = partition, "Partition present");
                }
            }
            key => {
                // Factory manifests say "board"; the device reports "product".
                let var = if key == "board" { "product" } else { key };
                let actual = session.get_var(var)?;
                let matched = actual
                    .as_deref()
                    .is_some_and(|a| accepted.iter().any(|v| *v == a));
                if !matched {
                    return Err(failed(format!(
                        "device reports {var}={:?}, manifest requires one of {accepted:?}",
                        actual.unwrap_or_default()
                    )));
                }
                debug!(var = var, "Requirement satisfied");
            }
        }
    }
    info!("Device satisfies requirements manifest");
    Ok(())
}

fn failed(detail: String) -> FlashError {
    FlashError::RequirementsFailed { detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockSession;

    fn device() -> MockSession {
        let mock = MockSession::new();
        mock.set_var("product", "raven");
        mock.set_var("version-bootloader", "slider-1.2-8739948");
        mock.set_var("partition-type:product", "ext4");
        mock
    }

    #[test]
    fn test_satisfied_manifest() {
        let mut session = device();
        let manifest = "# factory image\n\
                        require board=oriole|raven\n\
                        require version-bootloader=slider-1.2-8739948\n\
                        require partition-exists=product\n";
        assert!(check_requirements(manifest, &mut session).is_ok());
    }

    #[test]
    fn test_board_mismatch() {
        let mut session = device();
        let err = check_requirements("require board=oriole", &mut session).unwrap_err();
        assert!(matches!(err, FlashError::RequirementsFailed { .. }));
    }

    #[test]
    fn test_missing_partition() {
        let mut session = device();
        let err = check_requirements("require partition-exists=pvmfw", &mut session).unwrap_err();
        assert!(matches!(err, FlashError::RequirementsFailed { .. }));
    }

    #[test]
    fn test_malformed_line() {
        let mut session = device();
        for manifest in ["board=raven", "require board"] {
            assert!(matches!(
                check_requirements(manifest, &mut session),
                Err(FlashError::RequirementsFailed { .. })
            ));
        }
    }

    #[test]
    fn test_missing_variable_fails() {
        let mut session = device();
        let err = check_requirements("require version-baseband=g5123b-1", &mut session);
        assert!(matches!(err, Err(FlashError::RequirementsFailed { .. })));
    }
}
