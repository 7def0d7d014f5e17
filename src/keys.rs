//! Registry of logical data keys and their storage names.
//!
//! Every key maps to exactly one local cache slot (`studysync_<name>`) and one
//! remote resource (`<name>`). Names outside the known set are carried as
//! [`DataKey::Raw`] so new features can store data without a registry update.

use std::fmt;
use std::str::FromStr;

/// Prefix for every local cache slot name.
pub const LOCAL_PREFIX: &str = "studysync_";

/// Keys the application knows about ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KnownKey {
  Progress,
  Timetable,
  CustomSubjects,
  StudyStreak,
  ExamSession,
  Favorites,
  Preferences,
  Dashboard,
}

impl KnownKey {
  /// All known keys, in registry order.
  pub const ALL: [KnownKey; 8] = [
    KnownKey::Progress,
    KnownKey::Timetable,
    KnownKey::CustomSubjects,
    KnownKey::StudyStreak,
    KnownKey::ExamSession,
    KnownKey::Favorites,
    KnownKey::Preferences,
    KnownKey::Dashboard,
  ];

  /// The logical name, which is also the remote resource name.
  pub fn name(self) -> &'static str {
    match self {
      KnownKey::Progress => "progress",
      KnownKey::Timetable => "timetable",
      KnownKey::CustomSubjects => "custom-subjects",
      KnownKey::StudyStreak => "study-streak",
      KnownKey::ExamSession => "exam-session",
      KnownKey::Favorites => "favorites",
      KnownKey::Preferences => "preferences",
      KnownKey::Dashboard => "dashboard",
    }
  }

  fn from_name(name: &str) -> Option<Self> {
    KnownKey::ALL.into_iter().find(|k| k.name() == name)
  }
}

/// A logical key: either a registered one or an ad-hoc name passed through.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataKey {
  Known(KnownKey),
  Raw(RawKey),
}

/// An ad-hoc key name. Never equal to a registered name; built only by
/// [`DataKey::parse`] and the `From` conversions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawKey(String);

impl RawKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl DataKey {
  /// Build a key from its logical name.
  ///
  /// A name matching a known key always yields [`DataKey::Known`], so the same
  /// slot is never reachable through two different variants.
  pub fn parse(name: &str) -> Self {
    match KnownKey::from_name(name) {
      Some(known) => DataKey::Known(known),
      None => DataKey::Raw(RawKey(name.to_string())),
    }
  }

  /// Every known key.
  pub fn known() -> impl Iterator<Item = DataKey> {
    KnownKey::ALL.into_iter().map(DataKey::Known)
  }

  /// The logical name of this key.
  pub fn name(&self) -> &str {
    match self {
      DataKey::Known(k) => k.name(),
      DataKey::Raw(raw) => raw.as_str(),
    }
  }

  /// Slot name in the local cache.
  pub fn local_name(&self) -> String {
    format!("{}{}", LOCAL_PREFIX, self.name())
  }

  /// Resource name on the remote store.
  pub fn remote_name(&self) -> &str {
    self.name()
  }

  /// Reverse of [`DataKey::local_name`]. Returns `None` for slots without the prefix.
  pub fn from_local_name(local_name: &str) -> Option<Self> {
    local_name.strip_prefix(LOCAL_PREFIX).map(DataKey::parse)
  }

  /// Reverse of [`DataKey::remote_name`].
  pub fn from_remote_name(remote_name: &str) -> Self {
    DataKey::parse(remote_name)
  }
}

impl fmt::Display for DataKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for DataKey {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(DataKey::parse(s))
  }
}

impl From<KnownKey> for DataKey {
  fn from(key: KnownKey) -> Self {
    DataKey::Known(key)
  }
}

impl From<&str> for DataKey {
  fn from(name: &str) -> Self {
    DataKey::parse(name)
  }
}

impl From<String> for DataKey {
  fn from(name: String) -> Self {
    match KnownKey::from_name(&name) {
      Some(known) => DataKey::Known(known),
      None => DataKey::Raw(RawKey(name)),
    }
  }
}
