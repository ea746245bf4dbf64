//! Mock fastboot session for testing.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use super::traits::{FastbootSession, TransportError};
use crate::script::PartitionSlot;

/// One observable call made against the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    GetVar(String),
    Run(String),
    Erase(String),
    Flash {
        partition: String,
        slot: PartitionSlot,
        bytes: Vec<u8>,
    },
    Reboot(String),
}

/// Mock session for unit testing executor logic.
///
/// Clones share the variable map and call log, so a reconnect callback can
/// hand the executor a "new" session whose traffic still lands in the same
/// log.
#[derive(Clone, Default)]
pub struct MockSession {
    vars: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<SessionCall>>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable the device will report.
    pub fn set_var(&self, name: &str, value: &str) {
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    /// Remove a variable, simulating an unsupported getvar.
    pub fn clear_var(&self, name: &str) {
        self.vars.lock().unwrap().remove(name);
    }

    /// All captured calls, in order.
    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FastbootSession for MockSession {
    fn get_var(&mut self, name: &str) -> Result<Option<String>, TransportError> {
        self.record(SessionCall::GetVar(name.to_string()));
        Ok(self.vars.lock().unwrap().get(name).cloned())
    }

    fn run(&mut self, raw: &str) -> Result<(), TransportError> {
        self.record(SessionCall::Run(raw.to_string()));
        Ok(())
    }

    fn erase(&mut self, partition: &str) -> Result<(), TransportError> {
        self.record(SessionCall::Erase(partition.to_string()));
        Ok(())
    }

    fn flash(
        &mut self,
        partition: &str,
        slot: PartitionSlot,
        source: &mut dyn Read,
        size: u64,
        progress: &mut dyn FnMut(f32),
    ) -> Result<(), TransportError> {
        let mut bytes = Vec::new();
        source
            .read_to_end(&mut bytes)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        if bytes.len() as u64 != size {
            return Err(TransportError::WriteFailed(format!(
                "stream yielded {} bytes, {} declared",
                bytes.len(),
                size
            )));
        }
        if size > 0 {
            progress(0.0);
            progress(0.5);
        }
        progress(1.0);
        self.record(SessionCall::Flash {
            partition: partition.to_string(),
            slot,
            bytes,
        });
        Ok(())
    }

    fn reboot(self, target: &str) -> Result<(), TransportError> {
        self.record(SessionCall::Reboot(target.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_shared_across_clones() {
        let mock = MockSession::new();
        let mut a = mock.clone();
        let mut b = mock.clone();

        a.run("oem device-info").unwrap();
        b.erase("misc").unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                SessionCall::Run("oem device-info".into()),
                SessionCall::Erase("misc".into()),
            ]
        );
    }

    #[test]
    fn test_flash_checks_declared_size() {
        let mut mock = MockSession::new();
        let mut short: &[u8] = b"abc";
        let err = mock.flash("boot", PartitionSlot::Current, &mut short, 4, &mut |_| {});
        assert!(matches!(err, Err(TransportError::WriteFailed(_))));
    }

    #[test]
    fn test_vars() {
        let mock = MockSession::new();
        mock.set_var("product", "raven");
        let mut s = mock.clone();
        assert_eq!(s.get_var("product").unwrap().as_deref(), Some("raven"));
        assert_eq!(s.get_var("missing").unwrap(), None);
    }
}
