//! Scriptable payment gateway for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::domain::entitlement::{SessionObject, SubscriptionObject};
use crate::domain::foundation::UserId;
use crate::ports::{
    CreateSessionRequest, GatewayError, PaymentGateway, SessionHandle,
};

/// In-process gateway that answers from scripted state.
///
/// Tests seed sessions and subscriptions, then drive handlers against it.
/// Created checkout sessions are retained for assertion.
#[derive(Default)]
pub struct MockPaymentGateway {
    counter: AtomicU64,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, SessionObject>,
    subscriptions: HashMap<String, SubscriptionObject>,
    created_sessions: Vec<CreateSessionRequest>,
    fail_with: Option<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a network error, for outage tests.
    pub fn fail_with_network_error(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_with = Some(message.into());
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().fail_with = None;
    }

    pub fn seed_session(&self, session: SessionObject) {
        let mut state = self.state.lock().unwrap();
        state.sessions.insert(session.id.clone(), session);
    }

    pub fn seed_subscription(&self, subscription: SubscriptionObject) {
        let mut state = self.state.lock().unwrap();
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Checkout session requests passed to `create_checkout_session`.
    pub fn created_sessions(&self) -> Vec<CreateSessionRequest> {
        self.state.lock().unwrap().created_sessions.clone()
    }

    fn check_failure(&self) -> Result<(), GatewayError> {
        if let Some(message) = &self.state.lock().unwrap().fail_with {
            return Err(GatewayError::Network(message.clone()));
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_mock_{}", prefix, n)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(
        &self,
        _user_id: UserId,
        _email: &str,
    ) -> Result<String, GatewayError> {
        self.check_failure()?;
        Ok(self.next_id("cus"))
    }

    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionHandle, GatewayError> {
        self.check_failure()?;
        let id = self.next_id("cs");
        let mut state = self.state.lock().unwrap();
        state.created_sessions.push(request);
        Ok(SessionHandle {
            url: format!("https://pay.example.test/c/{}", id),
            id,
        })
    }

    async fn get_session(&self, session_ref: &str) -> Result<Option<SessionObject>, GatewayError> {
        self.check_failure()?;
        Ok(self.state.lock().unwrap().sessions.get(session_ref).cloned())
    }

    async fn get_subscription(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<SubscriptionObject>, GatewayError> {
        self.check_failure()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .get(subscription_ref)
            .cloned())
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_ref: &str,
        cancel: bool,
    ) -> Result<SubscriptionObject, GatewayError> {
        self.check_failure()?;
        let mut state = self.state.lock().unwrap();
        let subscription = state
            .subscriptions
            .get_mut(subscription_ref)
            .ok_or_else(|| GatewayError::Rejected("no such subscription".to_string()))?;
        subscription.cancel_at_period_end = cancel;
        Ok(subscription.clone())
    }

    async fn create_portal_session(
        &self,
        customer_ref: &str,
        _return_url: &str,
    ) -> Result<String, GatewayError> {
        self.check_failure()?;
        Ok(format!("https://pay.example.test/portal/{}", customer_ref))
    }
}
