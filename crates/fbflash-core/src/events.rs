//! Event system for UI decoupling.
//!
//! Allows CLI/GUI frontends to follow a flash run without tight coupling
//! to the executor.

use std::fmt;

/// What kind of work a progress event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    /// Erasing a partition.
    Wipe,
    /// Streaming an image to a partition.
    Flash,
    /// Rebooting the device.
    Reboot,
}

impl fmt::Display for ProgressAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressAction::Wipe => write!(f, "wipe"),
            ProgressAction::Flash => write!(f, "flash"),
            ProgressAction::Reboot => write!(f, "reboot"),
        }
    }
}

/// Events emitted by the flash executor.
#[derive(Debug, Clone)]
pub enum FlashEvent {
    /// A script command began executing.
    CommandStarted { index: usize, keyword: &'static str },
    /// Progress update.
    ///
    /// `item` names a partition, file reference, or `"device"`; `overall` is
    /// the whole-run fraction in `[0.0, 1.0]`.
    Progress {
        action: ProgressAction,
        item: String,
        overall: f32,
    },
    /// The full plan completed.
    Complete,
}

/// Observer trait for receiving flash events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait FlashObserver {
    /// Called when an event occurs.
    fn on_event(&self, event: &FlashEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl FlashObserver for NullObserver {
    fn on_event(&self, _event: &FlashEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl FlashObserver for TracingObserver {
    fn on_event(&self, event: &FlashEvent) {
        match event {
            FlashEvent::CommandStarted { index, keyword } => {
                tracing::info!(index = index, keyword = keyword, "Command started");
            }
            FlashEvent::Progress {
                action,
                item,
                overall,
            } => {
                tracing::debug!(
                    action = %action,
                    item = %item,
                    overall = %format!("{:.1}%", overall * 100.0),
                    "Progress"
                );
            }
            FlashEvent::Complete => {
                tracing::info!("Flash complete");
            }
        }
    }
}
