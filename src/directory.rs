use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{CoachId, UserId};

/// Identity data the scheduling core reads but never writes. Accounts,
/// profiles, and role management live in the identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoachProfile {
    pub id: CoachId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
}

/// Lookup seam to the identity collaborator. `find_coach` resolves only
/// identities carrying the coach role; a plain user id returns None there.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_coach(&self, id: CoachId) -> Option<CoachProfile>;
    async fn find_user(&self, id: UserId) -> Option<UserProfile>;
}

/// Map-backed directory for tests and single-process embedders.
#[derive(Default)]
pub struct InMemoryDirectory {
    coaches: DashMap<CoachId, CoachProfile>,
    users: DashMap<UserId, UserProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_coach(&self, profile: CoachProfile) {
        self.coaches.insert(profile.id, profile);
    }

    pub fn insert_user(&self, profile: UserProfile) {
        self.users.insert(profile.id, profile);
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn find_coach(&self, id: CoachId) -> Option<CoachProfile> {
        self.coaches.get(&id).map(|e| e.value().clone())
    }

    async fn find_user(&self, id: UserId) -> Option<UserProfile> {
        self.users.get(&id).map(|e| e.value().clone())
    }
}
