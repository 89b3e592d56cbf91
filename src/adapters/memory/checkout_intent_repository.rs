//! In-memory checkout intent repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::entitlement::CheckoutIntent;
use crate::domain::foundation::DomainError;
use crate::ports::CheckoutIntentRepository;

#[derive(Default)]
pub struct InMemoryCheckoutIntentRepository {
    intents: Mutex<HashMap<String, CheckoutIntent>>,
}

impl InMemoryCheckoutIntentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckoutIntentRepository for InMemoryCheckoutIntentRepository {
    async fn save(&self, intent: &CheckoutIntent) -> Result<(), DomainError> {
        let mut intents = self.intents.lock().unwrap();
        intents.insert(intent.external_session_ref.clone(), intent.clone());
        Ok(())
    }

    async fn find_by_session_ref(
        &self,
        session_ref: &str,
    ) -> Result<Option<CheckoutIntent>, DomainError> {
        let intents = self.intents.lock().unwrap();
        Ok(intents.get(session_ref).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::SessionMetadata;
    use crate::domain::foundation::{CourseId, Timestamp, UserId};

    #[tokio::test]
    async fn save_and_find_roundtrip() {
        let repo = InMemoryCheckoutIntentRepository::new();
        let metadata = SessionMetadata::Course {
            user_id: UserId::new(),
            course_id: CourseId::new(),
        };
        let intent =
            CheckoutIntent::from_metadata("cs_abc".to_string(), &metadata, Timestamp::now());

        repo.save(&intent).await.unwrap();
        let found = repo.find_by_session_ref("cs_abc").await.unwrap().unwrap();
        assert_eq!(found.user_id, intent.user_id);
        assert!(repo.find_by_session_ref("cs_missing").await.unwrap().is_none());
    }
}
