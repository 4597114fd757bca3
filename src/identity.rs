//! Who is reading, and what they may see and change.
//!
//! Sign-in data comes from the portal's identity provider and is kept in
//! storage next to everything else the browser would remember.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Storage, StorageError};

pub const TOKEN_KEY: &str = "csrd_arcgis_token";
pub const USER_KEY: &str = "csrd_arcgis_user";
pub const EXPIRES_KEY: &str = "csrd_arcgis_expires";
pub const GROUPS_KEY: &str = "csrd_arcgis_groups";
/// Lifetime granted when the provider does not say.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 14_400;

const EDITOR_MARKER: &str = "_editing";
const ADMIN_MARKER: &str = "admin";
const GLOBAL_ACCOUNT: &str = "csrd";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Municipality {
    Revelstoke,
    Golden,
    SalmonArm,
    Sicamous,
}

impl Municipality {
    pub const ALL: [Municipality; 4] = [
        Municipality::Revelstoke,
        Municipality::Golden,
        Municipality::SalmonArm,
        Municipality::Sicamous,
    ];

    pub fn from_route(route: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.route() == route)
    }

    /// Route name; also the fragment a username must contain.
    pub fn route(self) -> &'static str {
        match self {
            Municipality::Revelstoke => "revelstoke",
            Municipality::Golden => "golden",
            Municipality::SalmonArm => "salmonarm",
            Municipality::Sicamous => "sicamous",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Municipality::Revelstoke => "Revelstoke",
            Municipality::Golden => "Golden",
            Municipality::SalmonArm => "Salmon Arm",
            Municipality::Sicamous => "Sicamous",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            full_name: None,
        }
    }

    fn normalized(&self) -> String {
        self.username.to_lowercase()
    }

    pub fn is_global_admin(&self) -> bool {
        let name = self.normalized();
        name == GLOBAL_ACCOUNT || name.contains(ADMIN_MARKER)
    }

    pub fn is_editor(&self) -> bool {
        self.normalized().contains(EDITOR_MARKER) || self.is_global_admin()
    }

    pub fn has_access_to(&self, municipality: Municipality) -> bool {
        self.is_global_admin() || self.normalized().contains(municipality.route())
    }

    pub fn visible_municipalities(&self) -> Vec<Municipality> {
        Municipality::ALL
            .into_iter()
            .filter(|m| self.has_access_to(*m))
            .collect()
    }
}

/// Sign-in state kept in storage.
pub struct Identity;

impl Identity {
    pub fn sign_in(
        storage: &mut dyn Storage,
        token: &str,
        expires_in: Option<i64>,
        user: &User,
        groups: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let lifetime = TimeDelta::seconds(expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        let expires = (now + lifetime).timestamp_millis();
        storage.set(TOKEN_KEY, token)?;
        storage.set(EXPIRES_KEY, &expires.to_string())?;
        storage.set(USER_KEY, &to_json(user))?;
        storage.set(GROUPS_KEY, &to_json(groups))?;
        tracing::info!(username = %user.username, "signed in");
        Ok(())
    }

    /// A token is present and not past its expiry. An expired sign-in is
    /// cleared.
    pub fn is_authenticated(
        storage: &mut dyn Storage,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let (Some(_), Some(expires)) = (storage.get(TOKEN_KEY), storage.get(EXPIRES_KEY)) else {
            return Ok(false);
        };
        let expires = expires.trim().parse::<i64>().unwrap_or(0);
        if now.timestamp_millis() > expires {
            tracing::info!("sign-in expired");
            Self::sign_out(storage)?;
            return Ok(false);
        }
        Ok(true)
    }

    pub fn token(storage: &mut dyn Storage, now: DateTime<Utc>) -> Result<Option<String>, StorageError> {
        if Self::is_authenticated(storage, now)? {
            Ok(storage.get(TOKEN_KEY))
        } else {
            Ok(None)
        }
    }

    pub fn user(storage: &dyn Storage) -> Option<User> {
        let raw = storage.get(USER_KEY)?;
        serde_json::from_str(&raw)
            .inspect_err(|err| tracing::warn!(error = %err, "stored user is unreadable"))
            .ok()
    }

    pub fn groups(storage: &dyn Storage) -> Vec<String> {
        storage
            .get(GROUPS_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn sign_out(storage: &mut dyn Storage) -> Result<(), StorageError> {
        for key in [TOKEN_KEY, USER_KEY, EXPIRES_KEY, GROUPS_KEY] {
            storage.remove(key)?;
        }
        Ok(())
    }

    pub fn is_editor(storage: &dyn Storage) -> bool {
        Self::user(storage).is_some_and(|user| user.is_editor())
    }

    pub fn has_access_to(storage: &dyn Storage, municipality: Municipality) -> bool {
        Self::user(storage).is_some_and(|user| user.has_access_to(municipality))
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
