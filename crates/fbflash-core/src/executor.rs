//! Flash executor - interprets a plan against a live fastboot session.

use std::io::Read;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::archive::{FactoryArchive, StreamingEntryReader};
use crate::error::FlashError;
use crate::events::{FlashEvent, FlashObserver, ProgressAction};
use crate::plan::FlashPlan;
use crate::requirements::check_requirements;
use crate::script::{Command, PartitionSlot};
use crate::transport::{FastbootSession, Reconnect};

/// Partition holding the user's verified-boot key. The device refuses to
/// flash a replacement on top of an existing key, so it is erased even when
/// the wipe policy says to skip erases.
const AVB_CUSTOM_KEY: &str = "avb_custom_key";

const CURRENT_SLOT_VAR: &str = "current-slot";
const SNAPSHOT_STATUS_VAR: &str = "snapshot-update-status";
const SNAPSHOT_CANCEL: &str = "snapshot-update:cancel";

/// Configuration for a flash run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Path to the factory archive.
    pub archive_path: Option<String>,
    /// Serial of the device to flash; any fastboot device if unset.
    pub serial: Option<String>,
    /// Whether `erase` commands are executed.
    pub wipe: bool,
    /// How long to poll for the device after a reboot, in seconds.
    pub reconnect_timeout_secs: u64,
}

impl FlashConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FlashConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Walks a flash plan command by command.
///
/// The walk is strictly linear: each command completes or fails before the
/// next begins, and the first error aborts the run, tagged with the index
/// of the command that hit it. The session handle is owned for the duration
/// of `run` and replaced through the reconnect callback after a bootloader
/// reboot.
pub struct FlashExecutor<'a, A: FactoryArchive, O: FlashObserver> {
    plan: &'a FlashPlan,
    archive: &'a A,
    observer: &'a O,
    wipe: bool,
    flashed_bytes: u64,
}

impl<'a, A: FactoryArchive, O: FlashObserver> FlashExecutor<'a, A, O> {
    pub fn new(plan: &'a FlashPlan, archive: &'a A, observer: &'a O, wipe: bool) -> Self {
        Self {
            plan,
            archive,
            observer,
            wipe,
            flashed_bytes: 0,
        }
    }

    /// Run the whole plan.
    #[instrument(level = "info", skip_all)]
    pub fn run<S: FastbootSession, R: Reconnect<S>>(
        mut self,
        session: S,
        reconnect: &mut R,
    ) -> Result<(), FlashError> {
        let mut session = session;
        for (index, command) in self.plan.commands().iter().enumerate() {
            self.observer.on_event(&FlashEvent::CommandStarted {
                index,
                keyword: command.keyword(),
            });
            session = self
                .step(command, session, reconnect)
                .map_err(|source| FlashError::Command {
                    index,
                    keyword: command.keyword(),
                    source: Box::new(source),
                })?;
        }
        self.observer.on_event(&FlashEvent::Complete);
        info!("Flash plan complete");
        Ok(())
    }

    /// Overall progress fraction, by bytes flashed so far.
    fn overall(&self) -> f32 {
        let total = self.plan.total_flash_bytes();
        if total == 0 {
            0.0
        } else {
            (self.flashed_bytes as f64 / total as f64) as f32
        }
    }

    fn progress(&self, action: ProgressAction, item: &str, overall: f32) {
        self.observer.on_event(&FlashEvent::Progress {
            action,
            item: item.to_string(),
            overall,
        });
    }

    /// Execute one command, returning the (possibly re-bound) session.
    fn step<S: FastbootSession, R: Reconnect<S>>(
        &mut self,
        command: &Command,
        mut session: S,
        reconnect: &mut R,
    ) -> Result<S, FlashError> {
        let overall = self.overall();
        match command {
            Command::CheckRequirements { file_ref } => {
                let manifest = self.read_text_entry(file_ref)?;
                check_requirements(&manifest, &mut session)?;
            }

            Command::CheckVar { name, expected } => {
                let actual = session.get_var(name)?.unwrap_or_default();
                if actual != *expected {
                    return Err(FlashError::VarMismatch {
                        name: name.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
                debug!(name = %name, value = %actual, "Variable check passed");
            }

            Command::Erase { partition } => {
                self.progress(ProgressAction::Wipe, partition, overall);
                if self.wipe || partition == AVB_CUSTOM_KEY {
                    session.erase(partition)?;
                } else {
                    debug!(partition = %partition, "Skipping erase (wipe disabled)");
                }
            }

            Command::Flash {
                partition,
                file_ref,
                slot,
            } => {
                let entry =
                    self.archive
                        .entry(file_ref)
                        .ok_or_else(|| FlashError::MissingEntry {
                            file_ref: file_ref.clone(),
                        })?;
                let size = entry.uncompressed_size;
                let total = self.plan.total_flash_bytes();
                let share = if total == 0 {
                    0.0
                } else {
                    (size as f64 / total as f64) as f32
                };

                info!(partition = %partition, image = %file_ref, bytes = size, "Flashing");
                let mut reader = StreamingEntryReader::new(self.archive, entry)?;
                let observer = self.observer;
                session.flash(partition, *slot, &mut reader, size, &mut |frac| {
                    observer.on_event(&FlashEvent::Progress {
                        action: ProgressAction::Flash,
                        item: file_ref.clone(),
                        overall: overall + frac * share,
                    });
                })?;
                self.flashed_bytes += size;
            }

            Command::MaybeCancelSnapshotUpdate => {
                match session.get_var(SNAPSHOT_STATUS_VAR)? {
                    Some(status) if status != "none" => {
                        info!(status = %status, "Cancelling snapshot update");
                        session.run(SNAPSHOT_CANCEL)?;
                    }
                    Some(_) => debug!("No snapshot update in flight"),
                    // Older devices do not know the variable at all.
                    None => debug!("Device does not support snapshot updates"),
                }
            }

            Command::RebootBootloader => {
                self.progress(ProgressAction::Reboot, "device", overall);
                info!("Rebooting to bootloader");
                session.reboot("bootloader")?;
                session = reconnect.reconnect()?;
                info!("Session re-bound after reboot");
            }

            Command::RunCmd { raw } => {
                session.run(raw)?;
            }

            Command::ToggleActiveSlot => {
                let current = session.get_var(CURRENT_SLOT_VAR)?.unwrap_or_default();
                let other = PartitionSlot::complement(&current).ok_or(FlashError::UnknownSlot {
                    value: current.clone(),
                })?;
                info!(from = %current, to = %other, "Toggling active slot");
                session.run(&format!("set_active:{other}"))?;
            }
        }
        Ok(session)
    }

    fn read_text_entry(&self, file_ref: &str) -> Result<String, FlashError> {
        let entry = self
            .archive
            .entry(file_ref)
            .ok_or_else(|| FlashError::MissingEntry {
                file_ref: file_ref.to_string(),
            })?;
        let mut text = String::new();
        StreamingEntryReader::new(self.archive, entry)?
            .read_to_string(&mut text)
            .map_err(|_| {
                warn!(file_ref = %file_ref, "Entry is not valid UTF-8");
                FlashError::RequirementsFailed {
                    detail: format!("{file_ref} is not valid UTF-8"),
                }
            })?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MockArchive;
    use crate::transport::{MockSession, SessionCall, TransportError};
    use std::sync::Mutex;

    /// Observer capturing every event for assertions.
    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<FlashEvent>>,
    }

    impl RecordingObserver {
        fn progress_events(&self) -> Vec<(ProgressAction, String, f32)> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    FlashEvent::Progress {
                        action,
                        item,
                        overall,
                    } => Some((*action, item.clone(), *overall)),
                    _ => None,
                })
                .collect()
        }
    }

    impl FlashObserver for RecordingObserver {
        fn on_event(&self, event: &FlashEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn run_script(
        archive: &MockArchive,
        session: &MockSession,
        wipe: bool,
    ) -> (Result<(), FlashError>, RecordingObserver) {
        let plan = FlashPlan::from_archive(archive).unwrap();
        let observer = RecordingObserver::default();
        let executor = FlashExecutor::new(&plan, archive, &observer, wipe);
        let handle = session.clone();
        let mut reconnect = || Ok::<_, TransportError>(handle.clone());
        let result = executor.run(session.clone(), &mut reconnect);
        (result, observer)
    }

    #[test]
    fn test_empty_script_does_nothing() {
        let archive = MockArchive::new().with_stored("boot/script.txt", b"");
        let session = MockSession::new();

        let (result, observer) = run_script(&archive, &session, true);

        result.unwrap();
        assert!(session.calls().is_empty());
        assert!(observer.progress_events().is_empty());
    }

    #[test]
    fn test_check_var_and_erase() {
        let archive = MockArchive::new()
            .with_stored("f/script.txt", b"# header\ncheck-var product raven\n\nerase userdata\n");
        let session = MockSession::new();
        session.set_var("product", "raven");

        let (result, observer) = run_script(&archive, &session, true);

        result.unwrap();
        assert_eq!(
            session.calls(),
            vec![
                SessionCall::GetVar("product".into()),
                SessionCall::Erase("userdata".into()),
            ]
        );
        assert_eq!(
            observer.progress_events(),
            vec![(ProgressAction::Wipe, "userdata".into(), 0.0)]
        );
    }

    #[test]
    fn test_check_var_mismatch() {
        let archive = MockArchive::new().with_stored("f/script.txt", b"check-var product raven");
        let session = MockSession::new();
        session.set_var("product", "oriole");

        let (result, _) = run_script(&archive, &session, false);

        let FlashError::Command { index: 0, source, .. } = result.unwrap_err() else {
            panic!("expected command context");
        };
        assert!(matches!(
            *source,
            FlashError::VarMismatch { ref name, ref expected, ref actual }
                if name == "product" && expected == "raven" && actual == "oriole"
        ));
    }

    #[test]
    fn test_flash_other_slot() {
        let payload = vec![0xAB; 100];
        let archive = MockArchive::new()
            .with_stored("f/script.txt", b"flash boot boot.img other-slot")
            .with_stored("f/boot.img", &payload);
        let session = MockSession::new();

        let plan = FlashPlan::from_archive(&archive).unwrap();
        assert_eq!(plan.total_flash_bytes(), 100);

        let (result, observer) = run_script(&archive, &session, false);
        result.unwrap();

        assert_eq!(
            session.calls(),
            vec![SessionCall::Flash {
                partition: "boot".into(),
                slot: PartitionSlot::Other,
                bytes: payload,
            }]
        );
        let progress = observer.progress_events();
        assert_eq!(progress.first().map(|p| p.2), Some(0.0));
        assert_eq!(progress.last().map(|p| p.2), Some(1.0));
    }

    #[test]
    fn test_wipe_gating() {
        let archive = MockArchive::new()
            .with_stored("f/script.txt", b"erase userdata\nerase avb_custom_key\nerase metadata");
        let session = MockSession::new();

        let (result, observer) = run_script(&archive, &session, false);
        result.unwrap();

        // Only the key partition is actually erased.
        assert_eq!(
            session.calls(),
            vec![SessionCall::Erase("avb_custom_key".into())]
        );
        // But every erase reports its position.
        assert_eq!(observer.progress_events().len(), 3);
    }

    #[test]
    fn test_snapshot_cancel_gating() {
        let archive =
            MockArchive::new().with_stored("f/script.txt", b"maybe-cancel-snapshot-update");

        for (status, expect_cancel) in [
            (Some("none"), false),
            (Some("merging"), true),
            (None, false),
        ] {
            let session = MockSession::new();
            if let Some(status) = status {
                session.set_var("snapshot-update-status", status);
            }
            let (result, _) = run_script(&archive, &session, false);
            result.unwrap();

            let cancels = session
                .calls()
                .iter()
                .filter(|c| **c == SessionCall::Run("snapshot-update:cancel".into()))
                .count();
            assert_eq!(cancels, usize::from(expect_cancel), "status {status:?}");
        }
    }

    #[test]
    fn test_run_cmd_preserves_spaces() {
        let archive = MockArchive::new().with_stored("f/script.txt", b"run-cmd oem unlock confirm");
        let session = MockSession::new();

        let (result, _) = run_script(&archive, &session, false);
        result.unwrap();

        assert_eq!(
            session.calls(),
            vec![SessionCall::Run("oem unlock confirm".into())]
        );
    }

    #[test]
    fn test_toggle_active_slot_involution() {
        let archive = MockArchive::new().with_stored("f/script.txt", b"toggle-active-slot");

        let session = MockSession::new();
        session.set_var("current-slot", "a");
        run_script(&archive, &session, false).0.unwrap();

        // The device switched; toggling again must switch back.
        session.set_var("current-slot", "b");
        run_script(&archive, &session, false).0.unwrap();

        let toggles: Vec<_> = session
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SessionCall::Run(_)))
            .collect();
        assert_eq!(
            toggles,
            vec![
                SessionCall::Run("set_active:b".into()),
                SessionCall::Run("set_active:a".into()),
            ]
        );
    }

    #[test]
    fn test_toggle_unknown_slot() {
        let archive = MockArchive::new().with_stored("f/script.txt", b"toggle-active-slot");
        let session = MockSession::new();
        session.set_var("current-slot", "c");

        let (result, _) = run_script(&archive, &session, false);
        let FlashError::Command { source, .. } = result.unwrap_err() else {
            panic!("expected command context");
        };
        assert!(matches!(
            *source,
            FlashError::UnknownSlot { ref value } if value == "c"
        ));
    }

    #[test]
    fn test_reboot_rebinds_session() {
        let archive = MockArchive::new()
            .with_stored("f/script.txt", b"reboot-bootloader\nerase avb_custom_key");
        let session = MockSession::new();

        let (result, observer) = run_script(&archive, &session, false);
        result.unwrap();

        assert_eq!(
            session.calls(),
            vec![
                SessionCall::Reboot("bootloader".into()),
                SessionCall::Erase("avb_custom_key".into()),
            ]
        );
        assert_eq!(
            observer.progress_events()[0],
            (ProgressAction::Reboot, "device".into(), 0.0)
        );
    }

    #[test]
    fn test_requirements_checked_from_archive() {
        let archive = MockArchive::new()
            .with_stored("f/script.txt", b"check-requirements android-info.txt")
            .with_compressed("f/android-info.txt", b"require board=raven\n");

        let good = MockSession::new();
        good.set_var("product", "raven");
        run_script(&archive, &good, false).0.unwrap();

        let bad = MockSession::new();
        bad.set_var("product", "oriole");
        let (result, _) = run_script(&archive, &bad, false);
        let FlashError::Command { source, .. } = result.unwrap_err() else {
            panic!("expected command context");
        };
        assert!(matches!(*source, FlashError::RequirementsFailed { .. }));
    }

    #[test]
    fn test_progress_is_monotone_and_ends_at_one() {
        let archive = MockArchive::new()
            .with_stored(
                "f/script.txt",
                b"flash boot boot.img\nerase misc\nflash vendor vendor.img\nreboot-bootloader",
            )
            .with_stored("f/boot.img", &[1u8; 100])
            .with_compressed("f/vendor.img", &[2u8; 300]);
        let session = MockSession::new();

        let (result, observer) = run_script(&archive, &session, true);
        result.unwrap();

        let overalls: Vec<f32> = observer.progress_events().iter().map(|p| p.2).collect();
        assert!(
            overalls.windows(2).all(|w| w[0] <= w[1]),
            "not monotone: {overalls:?}"
        );
        assert_eq!(overalls.last().copied(), Some(1.0));
        // The erase between the flashes sits at the first flash's share.
        assert!(overalls.contains(&0.25));
    }

    #[test]
    fn test_flash_failure_carries_command_index() {
        let archive = MockArchive::new()
            .with_stored("f/script.txt", b"erase avb_custom_key\ncheck-var secure no");
        let session = MockSession::new();
        session.set_var("secure", "yes");

        let (result, _) = run_script(&archive, &session, false);
        assert!(matches!(
            result.unwrap_err(),
            FlashError::Command {
                index: 1,
                keyword: "check-var",
                ..
            }
        ));
    }

    #[test]
    fn test_config_round_trip() {
        let config = FlashConfig {
            archive_path: Some("factory.zip".into()),
            serial: Some("8AAY0PLAY".into()),
            wipe: true,
            reconnect_timeout_secs: 120,
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: FlashConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.archive_path.as_deref(), Some("factory.zip"));
        assert!(parsed.wipe);
    }
}
