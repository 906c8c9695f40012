use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::hasher::{AdditiveHash, HashKind, KeyHasher};

/// Defaults applied to every assignment that does not override them.
///
/// Settings are a plain value: they are not synchronized, and callers that
/// share them across threads must do so through their own wrapper (the HTTP
/// service swaps whole copies through `ArcSwap`).
#[derive(Clone)]
pub struct Settings {
    pub groups: Option<u32>,
    pub hasher: Arc<dyn KeyHasher>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            groups: None,
            hasher: Arc::new(AdditiveHash),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("groups", &self.groups)
            .field("hasher", &self.hasher.name())
            .finish()
    }
}

/// Partial settings; keys left as `None` keep their current value.
#[derive(Clone, Default)]
pub struct SettingsPatch {
    pub groups: Option<u32>,
    pub hasher: Option<Arc<dyn KeyHasher>>,
}

impl SettingsPatch {
    pub fn groups(mut self, groups: u32) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn hasher(mut self, hasher: impl KeyHasher + 'static) -> Self {
        self.hasher = Some(Arc::new(hasher));
        self
    }

    pub fn hash_kind(mut self, kind: HashKind) -> Self {
        self.hasher = Some(kind.build());
        self
    }
}

impl Settings {
    pub fn new(groups: Option<u32>, hasher: Arc<dyn KeyHasher>) -> Self {
        Self { groups, hasher }
    }

    /// Merges the keys present in `patch` into these settings.
    pub fn configure(&mut self, patch: SettingsPatch) {
        if let Some(groups) = patch.groups {
            self.groups = Some(groups);
        }
        if let Some(hasher) = patch.hasher {
            self.hasher = hasher;
        }
    }

    /// Replaces the default group count until the returned guard drops.
    ///
    /// The previous value is restored on every exit path, including early
    /// returns through `?` and unwinding panics.
    pub fn override_groups(&mut self, groups: u32) -> GroupsOverride<'_> {
        let previous = self.groups.replace(groups);
        GroupsOverride {
            settings: self,
            previous,
        }
    }
}

pub struct GroupsOverride<'a> {
    settings: &'a mut Settings,
    previous: Option<u32>,
}

impl Deref for GroupsOverride<'_> {
    type Target = Settings;

    fn deref(&self) -> &Settings {
        &*self.settings
    }
}

impl Drop for GroupsOverride<'_> {
    fn drop(&mut self) {
        self.settings.groups = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::*;

    #[test]
    fn configure_merges_only_given_keys() {
        let mut settings = Settings::default();
        settings.configure(SettingsPatch::default().groups(3));
        assert_eq!(settings.groups, Some(3));
        assert_eq!(settings.hasher.name(), "additive");

        settings.configure(SettingsPatch::default().hash_kind(HashKind::Xxh3));
        assert_eq!(settings.groups, Some(3));
        assert_eq!(settings.hasher.name(), "xxh3");

        settings.configure(SettingsPatch::default());
        assert_eq!(settings.groups, Some(3));
        assert_eq!(settings.hasher.name(), "xxh3");
    }

    #[test]
    fn override_restores_on_drop() {
        let mut settings = Settings::default();
        settings.configure(SettingsPatch::default().groups(10));
        {
            let scoped = settings.override_groups(2);
            assert_eq!(scoped.groups, Some(2));
        }
        assert_eq!(settings.groups, Some(10));
    }

    #[test]
    fn override_restores_unset_value() {
        let mut settings = Settings::default();
        drop(settings.override_groups(4));
        assert_eq!(settings.groups, None);
    }

    #[test]
    fn override_restores_on_panic() {
        let mut settings = Settings::default();
        settings.configure(SettingsPatch::default().groups(7));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let scoped = settings.override_groups(1);
            if scoped.groups == Some(1) {
                panic!("callback blew up");
            }
        }));
        assert!(result.is_err());
        assert_eq!(settings.groups, Some(7));
    }

    #[test]
    fn debug_shows_hasher_name() {
        let settings = Settings::new(Some(2), HashKind::Murmur3 { seed: 1 }.build());
        let text = format!("{settings:?}");
        assert!(text.contains("murmur3"), "{text}");
    }
}
