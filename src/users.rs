use crate::eid::Eid;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    sync::{Arc, RwLock},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Founder,
    Distributor,
}

impl Default for UserType {
    fn default() -> Self {
        UserType::Founder
    }
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Founder => "founder",
            UserType::Distributor => "distributor",
        }
    }
}

/// Identity record, created at OAuth callback time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub id: Eid,
    pub email: String,
    pub name: String,
    pub photo: String,

    #[serde(rename = "type")]
    pub user_type: UserType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
}

/// The profile blob an OAuth callback delivers, URL-encoded JSON.
///
/// Parsed strictly at the boundary: a blob without an email is rejected
/// rather than cast into a user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthProfile {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

impl OauthProfile {
    /// Parse a decoded callback token. Requires a non-empty email claim.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let profile: OauthProfile = serde_json::from_str(raw)?;
        if profile.email.trim().is_empty() {
            return Err(anyhow!("oauth profile has empty email"));
        }
        Ok(profile)
    }
}

/// What an upsert did, so callers can log/redirect accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Existing,
    PhotoRefreshed,
}

pub trait UserStore: Send + Sync {
    fn get(&self, id: &Eid) -> anyhow::Result<Option<UserData>>;
    fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserData>>;
    /// Insert-if-absent keyed by email; refresh the photo when the
    /// provider's picture changed.
    fn upsert_oauth(
        &self,
        profile: &OauthProfile,
        user_type: UserType,
    ) -> anyhow::Result<(UserData, UpsertOutcome)>;
}

const CSV_HEADERS: [&str; 10] = [
    "id",
    "email",
    "name",
    "photo",
    "type",
    "x",
    "github",
    "website",
    "instagram",
    "linkedin",
];

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<UserData>>>,
    path: String,
}

fn field(record: &csv::StringRecord, idx: usize, name: &str) -> anyhow::Result<String> {
    Ok(record
        .get(idx)
        .ok_or(anyhow!("couldnt get record {name}"))?
        .to_string())
}

fn optional(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new user database at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let mut users = vec![];
        let mut csv_reader = csv::Reader::from_path(path)?;
        for record in csv_reader.records() {
            let record = record?;

            let user_type = match field(&record, 4, "type")?.as_str() {
                "distributor" => UserType::Distributor,
                _ => UserType::Founder,
            };

            users.push(UserData {
                id: field(&record, 0, "id")?.into(),
                email: field(&record, 1, "email")?,
                name: field(&record, 2, "name")?,
                photo: field(&record, 3, "photo")?,
                user_type,
                x: optional(field(&record, 5, "x")?),
                github: optional(field(&record, 6, "github")?),
                website: optional(field(&record, 7, "website")?),
                instagram: optional(field(&record, 8, "instagram")?),
                linkedin: optional(field(&record, 9, "linkedin")?),
            });
        }

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(users)),
            path: path.to_string(),
        })
    }

    fn save(&self) {
        let users = self.list.read().expect("user store lock poisoned");

        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path).expect("writable user database");
        csv_wrt.write_record(CSV_HEADERS).expect("csv header");
        for user in users.iter() {
            csv_wrt
                .write_record([
                    user.id.as_str(),
                    &user.email,
                    &user.name,
                    &user.photo,
                    user.user_type.as_str(),
                    user.x.as_deref().unwrap_or_default(),
                    user.github.as_deref().unwrap_or_default(),
                    user.website.as_deref().unwrap_or_default(),
                    user.instagram.as_deref().unwrap_or_default(),
                    user.linkedin.as_deref().unwrap_or_default(),
                ])
                .expect("csv record");
        }
        csv_wrt.flush().expect("csv flush");
        std::fs::rename(&temp_path, &self.path).expect("csv rename");
    }
}

impl UserStore for BackendCsv {
    fn get(&self, id: &Eid) -> anyhow::Result<Option<UserData>> {
        let users = self.list.read().expect("user store lock poisoned");
        Ok(users.iter().find(|user| &user.id == id).cloned())
    }

    fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserData>> {
        let users = self.list.read().expect("user store lock poisoned");
        Ok(users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn upsert_oauth(
        &self,
        profile: &OauthProfile,
        user_type: UserType,
    ) -> anyhow::Result<(UserData, UpsertOutcome)> {
        let mut users = self.list.write().expect("user store lock poisoned");

        if let Some(user) = users
            .iter_mut()
            .find(|user| user.email.eq_ignore_ascii_case(&profile.email))
        {
            let picture = profile.picture.clone().unwrap_or_default();
            if !picture.is_empty() && picture != user.photo {
                log::info!("refreshing photo for {}", user.email);
                user.photo = picture;
                let result = user.clone();
                drop(users);
                self.save();
                return Ok((result, UpsertOutcome::PhotoRefreshed));
            }
            return Ok((user.clone(), UpsertOutcome::Existing));
        }

        let user = UserData {
            id: Eid::new(),
            email: profile.email.clone(),
            name: profile.name.clone().unwrap_or_default(),
            photo: profile.picture.clone().unwrap_or_default(),
            user_type,
            ..Default::default()
        };

        users.push(user.clone());
        drop(users);
        self.save();

        Ok((user, UpsertOutcome::Created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (BackendCsv, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("users.csv");
        let store = BackendCsv::load(path.to_str().unwrap()).unwrap();
        (store, tmp)
    }

    fn profile(email: &str, picture: &str) -> OauthProfile {
        OauthProfile {
            email: email.to_string(),
            name: Some("Test User".to_string()),
            picture: Some(picture.to_string()),
            email_verified: Some(true),
            given_name: None,
            family_name: None,
        }
    }

    #[test]
    fn test_parse_rejects_missing_email() {
        assert!(OauthProfile::parse(r#"{"name":"No Email"}"#).is_err());
        assert!(OauthProfile::parse(r#"{"email":"  "}"#).is_err());
        assert!(OauthProfile::parse("not json").is_err());
    }

    #[test]
    fn test_upsert_creates_then_reuses() {
        let (store, _tmp) = store();
        let p = profile("founder@example.com", "https://img/1.png");

        let (user, outcome) = store.upsert_oauth(&p, UserType::Founder).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(user.user_type, UserType::Founder);

        let (again, outcome) = store.upsert_oauth(&p, UserType::Distributor).unwrap();
        assert_eq!(outcome, UpsertOutcome::Existing);
        // existing row keeps its original type
        assert_eq!(again.user_type, UserType::Founder);
        assert_eq!(again.id, user.id);
    }

    #[test]
    fn test_upsert_refreshes_changed_photo() {
        let (store, _tmp) = store();
        store
            .upsert_oauth(&profile("a@example.com", "https://img/old.png"), UserType::Founder)
            .unwrap();

        let (user, outcome) = store
            .upsert_oauth(&profile("a@example.com", "https://img/new.png"), UserType::Founder)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::PhotoRefreshed);
        assert_eq!(user.photo, "https://img/new.png");
    }

    #[test]
    fn test_email_lookup_case_insensitive() {
        let (store, _tmp) = store();
        store
            .upsert_oauth(&profile("MiXeD@Example.com", ""), UserType::Distributor)
            .unwrap();

        let found = store.find_by_email("mixed@example.com").unwrap();
        assert!(found.is_some());
    }
}
