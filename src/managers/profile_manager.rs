// ProfileManager: Focused manager for the active calibration profile
//
// Single Responsibility: which profile the next session interpolates with.
// Profiles are read from the ProfileStore; the active curve is shared with
// sessions as an Arc so a swap never disturbs a running session.

use std::io::Read;
use std::sync::{Arc, RwLock};

use crate::error::{log_profile_error, ProfileError};
use crate::profile::{ProfileCurve, ProfileStore};

/// Named profile currently in use
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveProfile {
    pub name: String,
    pub curve: Arc<ProfileCurve>,
}

/// Manages profile persistence and the active profile
///
/// # Example
/// ```ignore
/// let manager = ProfileManager::new(ProfileStore::new("profiles"));
/// manager.activate("office")?;
/// let curve = manager.active()?;
/// ```
pub struct ProfileManager {
    store: ProfileStore,
    active: Arc<RwLock<Option<ActiveProfile>>>,
}

impl ProfileManager {
    pub fn new(store: ProfileStore) -> Self {
        Self {
            store,
            active: Arc::new(RwLock::new(None)),
        }
    }

    /// Names of all stored profiles
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        self.store.list()
    }

    /// Import a profile into the store without activating it
    pub fn import<R: Read>(&self, name: &str, reader: R) -> Result<ProfileCurve, ProfileError> {
        self.store.import(name, reader)
    }

    /// Load a stored profile and make it active
    ///
    /// # Errors
    /// - Profile missing, unreadable or without a valid point
    /// - Lock poisoning on the active profile
    pub fn activate(&self, name: &str) -> Result<Arc<ProfileCurve>, ProfileError> {
        let curve = self.store.load(name).inspect_err(|err| {
            log_profile_error(err, "activate_profile");
        })?;
        self.set_active(name, curve)
    }

    /// Make an in-memory curve active
    pub fn set_active(
        &self,
        name: &str,
        curve: ProfileCurve,
    ) -> Result<Arc<ProfileCurve>, ProfileError> {
        let curve = Arc::new(curve);
        let mut guard = self.write_active()?;
        *guard = Some(ActiveProfile {
            name: name.to_string(),
            curve: Arc::clone(&curve),
        });
        log::info!(
            "[ProfileManager] Active profile '{}' ({} points)",
            name,
            curve.len()
        );
        Ok(curve)
    }

    /// Curve for the next session
    ///
    /// # Errors
    /// - No profile activated yet
    /// - Lock poisoning on the active profile
    pub fn active(&self) -> Result<Arc<ProfileCurve>, ProfileError> {
        self.read_active()?
            .as_ref()
            .map(|profile| Arc::clone(&profile.curve))
            .ok_or(ProfileError::NoActiveProfile)
    }

    pub fn active_profile(&self) -> Result<Option<ActiveProfile>, ProfileError> {
        Ok(self.read_active()?.clone())
    }

    pub fn deactivate(&self) -> Result<(), ProfileError> {
        *self.write_active()? = None;
        Ok(())
    }

    fn read_active(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, Option<ActiveProfile>>, ProfileError> {
        self.active.read().map_err(|_| ProfileError::StatePoisoned)
    }

    fn write_active(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Option<ActiveProfile>>, ProfileError> {
        self.active.write().map_err(|_| ProfileError::StatePoisoned)
    }
}
