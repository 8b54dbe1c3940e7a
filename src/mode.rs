//! Selection of how enqueued jobs are handled.
//!
//! A [`ModeController`] holds a single [`Mode`] shared by every clone of the
//! controller. Scoped overrides are expressed as [`ModeGuard`]s: the guard
//! remembers the mode that was active when it was created and puts it back
//! when dropped, so an override also unwinds when the body returns an error
//! or panics.
//!
//! # Examples
//!
//! ```rust
//! use jobharness::{Mode, ModeController};
//!
//! let modes = ModeController::default();
//! assert!(modes.is_fake());
//!
//! modes.with_mode(Mode::Inline, || {
//!     assert!(modes.is_inline());
//! });
//!
//! assert!(modes.is_fake());
//! ```

use crate::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Enqueues go to the real submission path.
    Disabled,
    /// Enqueues are stored in the in-memory queue store.
    #[default]
    Fake,
    /// Enqueues execute immediately.
    Inline,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Disabled => "disabled",
            Mode::Fake => "fake",
            Mode::Inline => "inline",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "disable" => Ok(Mode::Disabled),
            "fake" => Ok(Mode::Fake),
            "inline" => Ok(Mode::Inline),
            _ => Err(HarnessError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ModeController {
    current: Arc<Mutex<Mode>>,
}

impl ModeController {
    pub fn new(mode: Mode) -> Self {
        Self {
            current: Arc::new(Mutex::new(mode)),
        }
    }

    // A panicking test must not poison the mode for the rest of the suite.
    fn lock(&self) -> MutexGuard<'_, Mode> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> Mode {
        *self.lock()
    }

    /// Set the mode and return the one it replaced.
    pub fn set_mode(&self, mode: Mode) -> Mode {
        let previous = std::mem::replace(&mut *self.lock(), mode);
        if previous != mode {
            debug!("Testing mode changed from {} to {}", previous, mode);
        }
        previous
    }

    pub fn fake(&self) {
        self.set_mode(Mode::Fake);
    }

    pub fn inline(&self) {
        self.set_mode(Mode::Inline);
    }

    pub fn disable(&self) {
        self.set_mode(Mode::Disabled);
    }

    /// Switch to `mode` until the returned guard is dropped.
    #[must_use = "the previous mode is restored as soon as the guard is dropped"]
    pub fn override_mode(&self, mode: Mode) -> ModeGuard {
        let previous = self.set_mode(mode);
        ModeGuard {
            controller: self.clone(),
            previous,
        }
    }

    /// Run `body` under `mode`, restoring the previous mode afterwards.
    pub fn with_mode<T>(&self, mode: Mode, body: impl FnOnce() -> T) -> T {
        let _guard = self.override_mode(mode);
        body()
    }

    /// Async counterpart of [`with_mode`](Self::with_mode).
    pub async fn with_mode_async<F, Fut, T>(&self, mode: Mode, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.override_mode(mode);
        body().await
    }

    pub fn is_enabled(&self) -> bool {
        self.mode() != Mode::Disabled
    }

    pub fn is_disabled(&self) -> bool {
        self.mode() == Mode::Disabled
    }

    pub fn is_fake(&self) -> bool {
        self.mode() == Mode::Fake
    }

    pub fn is_inline(&self) -> bool {
        self.mode() == Mode::Inline
    }
}

/// Restores the saved mode on drop.
#[derive(Debug)]
pub struct ModeGuard {
    controller: ModeController,
    previous: Mode,
}

impl ModeGuard {
    pub fn previous(&self) -> Mode {
        self.previous
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        self.controller.set_mode(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fake() {
        let modes = ModeController::default();
        assert_eq!(modes.mode(), Mode::Fake);
        assert!(modes.is_enabled());
        assert!(!modes.is_disabled());
    }

    #[test]
    fn test_queries_follow_mode() {
        let modes = ModeController::default();

        modes.inline();
        assert!(modes.is_inline());
        assert!(modes.is_enabled());

        modes.disable();
        assert!(modes.is_disabled());
        assert!(!modes.is_enabled());
        assert!(!modes.is_fake());

        modes.fake();
        assert!(modes.is_fake());
    }

    #[test]
    fn test_nested_overrides_restore_in_order() {
        let modes = ModeController::new(Mode::Disabled);

        modes.with_mode(Mode::Fake, || {
            modes.with_mode(Mode::Inline, || {
                assert!(modes.is_inline());
            });
            assert!(modes.is_fake());
        });

        assert!(modes.is_disabled());
    }

    #[test]
    fn test_override_restored_on_error() {
        let modes = ModeController::default();

        let result: Result<()> = modes.with_mode(Mode::Inline, || {
            Err(HarnessError::worker("failed inside override"))
        });

        assert!(result.is_err());
        assert!(modes.is_fake());
    }

    #[test]
    fn test_override_restored_on_panic() {
        let modes = ModeController::default();
        let inner = modes.clone();

        let outcome = std::panic::catch_unwind(move || {
            inner.with_mode(Mode::Disabled, || panic!("boom"));
        });

        assert!(outcome.is_err());
        assert!(modes.is_fake());
    }

    #[test]
    fn test_guard_reports_previous() {
        let modes = ModeController::default();
        let guard = modes.override_mode(Mode::Inline);
        assert_eq!(guard.previous(), Mode::Fake);
        drop(guard);
        assert!(modes.is_fake());
    }

    #[test]
    fn test_async_override() {
        let modes = ModeController::default();

        let seen = tokio_test::block_on(modes.with_mode_async(Mode::Inline, || async {
            modes.mode()
        }));

        assert_eq!(seen, Mode::Inline);
        assert!(modes.is_fake());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("fake".parse::<Mode>().unwrap(), Mode::Fake);
        assert_eq!(" Inline ".parse::<Mode>().unwrap(), Mode::Inline);
        assert_eq!("disable".parse::<Mode>().unwrap(), Mode::Disabled);
        assert!(matches!(
            "sometimes".parse::<Mode>(),
            Err(HarnessError::InvalidMode { .. })
        ));
        assert_eq!(Mode::Disabled.to_string(), "disabled");
    }
}
