//! Do-Not-Disturb policy and the user profile that owns it.
//!
//! [`ProfileManager`] loads the profile from the key-value store, applies the
//! quiet-period edits coming from the UI, re-persists after every edit and
//! hands out policy snapshots to the scheduler through [`PolicyProvider`].

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::quiet_period::QuietPeriod;
use crate::store::KeyValueStore;

/// Key of the serialized profile blob
pub const PROFILE_KEY: &str = "com.novelty.userProfile";

/// Quiet periods plus the master switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DndPolicy {
    pub quiet_periods: Vec<QuietPeriod>,
    pub globally_enabled: bool,
}

impl Default for DndPolicy {
    fn default() -> Self {
        Self {
            quiet_periods: Vec::new(),
            globally_enabled: true,
        }
    }
}

impl DndPolicy {
    pub fn new(quiet_periods: Vec<QuietPeriod>, globally_enabled: bool) -> Self {
        Self {
            quiet_periods,
            globally_enabled,
        }
    }

    pub fn add_period(&mut self, period: QuietPeriod) {
        self.quiet_periods.push(period);
    }

    /// Replace the period with the same id. Returns `false` if no period matched.
    pub fn update_period(&mut self, period: QuietPeriod) -> bool {
        match self.quiet_periods.iter_mut().find(|p| p.id() == period.id()) {
            Some(slot) => {
                *slot = period;
                true
            }
            None => false,
        }
    }

    pub fn remove_period(&mut self, id: Uuid) -> Option<QuietPeriod> {
        let pos = self.quiet_periods.iter().position(|p| p.id() == id)?;
        Some(self.quiet_periods.remove(pos))
    }

    pub fn period(&self, id: Uuid) -> Option<&QuietPeriod> {
        self.quiet_periods.iter().find(|p| p.id() == id)
    }

    pub fn set_globally_enabled(&mut self, enabled: bool) {
        self.globally_enabled = enabled;
    }

    pub fn enabled_periods(&self) -> impl Iterator<Item = &QuietPeriod> {
        self.quiet_periods.iter().filter(|p| p.enabled)
    }
}

/// The persisted user profile.
///
/// Only the DND preferences are modelled; other fields the host app stores in
/// the same blob are ignored on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(default)]
    pub quiet_periods: Vec<QuietPeriod>,
    #[serde(default = "dnd_on")]
    pub dnd_globally_enabled: bool,
}

fn dnd_on() -> bool {
    true
}

impl UserProfile {
    /// Blank profile used on first launch or when the stored one is unreadable.
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            quiet_periods: Vec::new(),
            dnd_globally_enabled: true,
        }
    }

    /// Decode the stored blob.
    pub fn decode(raw: &str) -> Result<Self, StoreError> {
        serde_json::from_str(raw).map_err(|source| StoreError::Decode {
            key: PROFILE_KEY.to_string(),
            source,
        })
    }

    pub fn policy(&self) -> DndPolicy {
        DndPolicy::new(self.quiet_periods.clone(), self.dnd_globally_enabled)
    }

    fn apply(&mut self, policy: DndPolicy) {
        self.quiet_periods = policy.quiet_periods;
        self.dnd_globally_enabled = policy.globally_enabled;
    }
}

/// Where the scheduler gets the policy it evaluates against.
pub trait PolicyProvider: Send + Sync {
    fn policy(&self) -> DndPolicy;
}

impl PolicyProvider for DndPolicy {
    fn policy(&self) -> DndPolicy {
        self.clone()
    }
}

/// Owns the user profile and keeps the persisted copy in sync.
pub struct ProfileManager {
    profile: RwLock<UserProfile>,
    store: Arc<dyn KeyValueStore>,
}

impl ProfileManager {
    /// Load the saved profile, falling back to an empty one if it is missing
    /// or cannot be decoded.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let profile = match store.get(PROFILE_KEY) {
            Ok(Some(raw)) => match UserProfile::decode(&raw) {
                Ok(profile) => {
                    info!(
                        "Profile loaded ({} quiet period(s), DND {})",
                        profile.quiet_periods.len(),
                        if profile.dnd_globally_enabled { "on" } else { "off" }
                    );
                    profile
                }
                Err(e) => {
                    warn!("{}, using defaults", e);
                    UserProfile::empty()
                }
            },
            Ok(None) => {
                info!("No saved profile found, using defaults");
                UserProfile::empty()
            }
            Err(e) => {
                warn!("Failed to read saved profile, using defaults: {}", e);
                UserProfile::empty()
            }
        };

        Self {
            profile: RwLock::new(profile),
            store,
        }
    }

    pub fn profile(&self) -> UserProfile {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole profile (onboarding completion) and persist it.
    pub fn replace(&self, profile: UserProfile) -> Result<(), StoreError> {
        self.mutate(|p| {
            *p = profile;
        })
        .map(|_| ())
    }

    pub fn add_quiet_period(&self, period: QuietPeriod) -> Result<(), StoreError> {
        self.edit_policy(|policy| policy.add_period(period)).map(|_| ())
    }

    /// Returns `Ok(false)` if no period with that id exists (nothing is saved).
    pub fn update_quiet_period(&self, period: QuietPeriod) -> Result<bool, StoreError> {
        self.edit_policy(|policy| policy.update_period(period))
    }

    pub fn remove_quiet_period(&self, id: Uuid) -> Result<Option<QuietPeriod>, StoreError> {
        self.edit_policy(|policy| policy.remove_period(id))
    }

    pub fn set_dnd_globally_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.edit_policy(|policy| policy.set_globally_enabled(enabled))
            .map(|_| ())
    }

    /// Persist the current profile.
    ///
    /// The encoded blob is written in a single `set`; if encoding fails nothing
    /// is written and the previously stored profile stays as it was.
    pub fn save(&self) -> Result<(), StoreError> {
        let profile = self.profile();
        Self::persist(self.store.as_ref(), &profile)
    }

    fn persist(store: &dyn KeyValueStore, profile: &UserProfile) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(profile).map_err(|source| StoreError::Encode {
            key: PROFILE_KEY.to_string(),
            source,
        })?;
        store.set(PROFILE_KEY, &encoded)?;
        info!("Profile saved");
        Ok(())
    }

    fn edit_policy<T>(&self, f: impl FnOnce(&mut DndPolicy) -> T) -> Result<T, StoreError> {
        self.mutate(|profile| {
            let mut policy = profile.policy();
            let out = f(&mut policy);
            profile.apply(policy);
            out
        })
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut UserProfile) -> T) -> Result<T, StoreError> {
        let mut profile = self.profile.write().unwrap_or_else(PoisonError::into_inner);
        let before = profile.clone();
        let out = f(&mut profile);
        if *profile == before {
            return Ok(out);
        }
        if let Err(e) = Self::persist(self.store.as_ref(), &profile) {
            warn!("Failed to save profile, keeping the edit in memory only: {}", e);
            return Err(e);
        }
        Ok(out)
    }
}

impl PolicyProvider for ProfileManager {
    fn policy(&self) -> DndPolicy {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .policy()
    }
}
