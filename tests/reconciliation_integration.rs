//! End-to-end flows over the in-memory adapters.
//!
//! These tests wire the full stack the way the binary does - checkout,
//! fallback verification, gift redemption, and webhook intake all sharing
//! one reconciler - and drive it through multi-step scenarios:
//!
//! - a plan purchase confirmed by webhook, then re-verified by the client
//! - the fallback verifier landing before the webhook
//! - redelivered events acknowledged from the journal without reprocessing
//! - out-of-order deliveries discarded in favor of newer state
//! - the dunning cycle (payment failed, then recovered)
//! - gift purchase, validation, and redemption, including the extension
//!   rule for recipients with an active subscription
//! - concurrent redemption of one code by many users
//! - courses never sold twice

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use skillforge_entitlements::adapters::catalog::StaticPlanCatalog;
use skillforge_entitlements::adapters::memory::{
    InMemoryCheckoutIntentRepository, InMemoryEntitlementRepository, InMemoryGiftCodeRepository,
    InMemoryProcessedEventStore,
};
use skillforge_entitlements::adapters::stripe::MockPaymentGateway;
use skillforge_entitlements::application::handlers::{
    CheckoutKind, CheckoutUrls, CreateCheckout, GiftService, ProcessPaymentWebhook,
    ReconcileOutcome, ReconciliationService, VerifyCheckout, VerifyOutcome,
};
use skillforge_entitlements::domain::entitlement::{
    BillingCycle, EntitlementError, GiftCode, GiftCodeStatus, Plan, SessionObject,
    SubscriptionObject, SubscriptionStatus, WebhookVerifier,
};
use skillforge_entitlements::domain::foundation::{CourseId, PlanRef, Timestamp, UserId};
use skillforge_entitlements::ports::{
    EntitlementRepository, GiftCodeRepository, ProcessedEventStore,
};

const SECRET: &str = "whsec_integration_test";

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

struct Stack {
    entitlements: Arc<InMemoryEntitlementRepository>,
    gift_codes: Arc<InMemoryGiftCodeRepository>,
    journal: Arc<InMemoryProcessedEventStore>,
    gateway: Arc<MockPaymentGateway>,
    checkout: CreateCheckout,
    verify: VerifyCheckout,
    gifts: Arc<GiftService>,
    webhook: ProcessPaymentWebhook,
}

fn premium() -> Plan {
    Plan {
        plan_ref: PlanRef::try_from("premium").unwrap(),
        name: "Premium".to_string(),
        monthly_price_id: Some("price_prem_m".to_string()),
        yearly_price_id: Some("price_prem_y".to_string()),
        monthly_amount_cents: 1299,
        yearly_amount_cents: 12990,
        currency: "usd".to_string(),
        profiles_allowed: 4,
        can_download: true,
    }
}

fn stack() -> Stack {
    let entitlements = Arc::new(InMemoryEntitlementRepository::new());
    let gift_codes = Arc::new(InMemoryGiftCodeRepository::new());
    let journal = Arc::new(InMemoryProcessedEventStore::new());
    let gateway = Arc::new(MockPaymentGateway::new());
    let catalog = Arc::new(StaticPlanCatalog::new(vec![premium()]));

    let reconciler = Arc::new(ReconciliationService::new(
        entitlements.clone(),
        gateway.clone(),
        catalog.clone(),
    ));

    let checkout = CreateCheckout::new(
        entitlements.clone(),
        gateway.clone(),
        catalog.clone(),
        Arc::new(InMemoryCheckoutIntentRepository::new()),
        gift_codes.clone(),
        CheckoutUrls {
            success_url: "https://app.example.test/done".to_string(),
            cancel_url: "https://app.example.test/cancel".to_string(),
        },
    );
    let verify = VerifyCheckout::new(gateway.clone(), reconciler.clone());
    let gifts = Arc::new(GiftService::new(
        gift_codes.clone(),
        entitlements.clone(),
        gateway.clone(),
        catalog,
    ));
    let webhook = ProcessPaymentWebhook::new(
        WebhookVerifier::new(SECRET),
        journal.clone(),
        reconciler,
    );

    Stack {
        entitlements,
        gift_codes,
        journal,
        gateway,
        checkout,
        verify,
        gifts,
        webhook,
    }
}

fn sign(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("t={},v1={}", timestamp, digest)
}

async fn deliver(stack: &Stack, payload: &str) -> ReconcileOutcome {
    stack
        .webhook
        .execute(payload.as_bytes(), &sign(payload))
        .await
        .unwrap()
}

fn plan_session_metadata(user: UserId) -> serde_json::Value {
    json!({
        "purchase_kind": "plan_subscription",
        "user_id": user.to_string(),
        "plan_ref": "premium",
        "billing_cycle": "monthly"
    })
}

fn checkout_completed(event_id: &str, created: i64, session_ref: &str, user: UserId) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": created,
        "data": {
            "object": {
                "id": session_ref,
                "payment_status": "paid",
                "customer": "cus_it",
                "subscription": "sub_it",
                "metadata": plan_session_metadata(user)
            }
        },
        "livemode": false
    })
    .to_string()
}

fn subscription_event(event_id: &str, event_type: &str, created: i64, status: &str, period: (i64, i64)) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "created": created,
        "data": {
            "object": {
                "id": "sub_it",
                "customer": "cus_it",
                "status": status,
                "current_period_start": period.0,
                "current_period_end": period.1
            }
        },
        "livemode": false
    })
    .to_string()
}

fn invoice_event(event_id: &str, event_type: &str, created: i64, period: (i64, i64)) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "created": created,
        "data": {
            "object": {
                "id": format!("in_{}", event_id),
                "customer": "cus_it",
                "subscription": "sub_it",
                "period_start": period.0,
                "period_end": period.1
            }
        },
        "livemode": false
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Plan purchase
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plan_purchase_confirmed_by_webhook_then_reverified_by_client() {
    let stack = stack();
    let user = UserId::new();
    let created = chrono::Utc::now().timestamp();

    let session = stack
        .checkout
        .execute(
            user,
            "buyer@example.test",
            CheckoutKind::Plan {
                plan_ref: PlanRef::try_from("premium").unwrap(),
                billing_cycle: BillingCycle::Monthly,
            },
        )
        .await
        .unwrap();
    assert!(session.url.contains(&session.session_ref));
    assert!(session.gift_code.is_none());

    // The authority settles the payment.
    let mut metadata = HashMap::new();
    metadata.insert("purchase_kind".to_string(), "plan_subscription".to_string());
    metadata.insert("user_id".to_string(), user.to_string());
    metadata.insert("plan_ref".to_string(), "premium".to_string());
    metadata.insert("billing_cycle".to_string(), "monthly".to_string());
    stack.gateway.seed_session(SessionObject {
        id: session.session_ref.clone(),
        payment_status: "paid".to_string(),
        customer: Some("cus_it".to_string()),
        subscription: Some("sub_it".to_string()),
        metadata,
    });
    stack.gateway.seed_subscription(SubscriptionObject {
        id: "sub_it".to_string(),
        customer: "cus_it".to_string(),
        status: "active".to_string(),
        current_period_start: created,
        current_period_end: created + 86_400 * 30,
        cancel_at_period_end: false,
    });

    let payload = checkout_completed("evt_plan_1", created, &session.session_ref, user);
    assert_eq!(deliver(&stack, &payload).await, ReconcileOutcome::Applied);

    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    let sub = record.subscription.as_ref().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.external_subscription_ref.as_deref(), Some("sub_it"));
    assert_eq!(sub.period_end.as_unix_secs(), created + 86_400 * 30);
    assert!(record.has_access(Timestamp::now()));
    let version_after_webhook = record.version;

    // Client lands back from checkout and verifies; nothing changes.
    let outcome = stack
        .verify
        .execute(user, &session.session_ref)
        .await
        .unwrap();
    assert_eq!(outcome, VerifyOutcome::Confirmed(ReconcileOutcome::Duplicate));
    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    assert_eq!(record.version, version_after_webhook);
}

#[tokio::test]
async fn verify_before_webhook_makes_webhook_a_duplicate() {
    let stack = stack();
    let user = UserId::new();
    let created = chrono::Utc::now().timestamp();

    let mut metadata = HashMap::new();
    metadata.insert("purchase_kind".to_string(), "plan_subscription".to_string());
    metadata.insert("user_id".to_string(), user.to_string());
    metadata.insert("plan_ref".to_string(), "premium".to_string());
    metadata.insert("billing_cycle".to_string(), "monthly".to_string());
    stack.gateway.seed_session(SessionObject {
        id: "cs_fast_return".to_string(),
        payment_status: "paid".to_string(),
        customer: Some("cus_it".to_string()),
        subscription: Some("sub_it".to_string()),
        metadata,
    });

    // Verifier wins the race.
    let outcome = stack.verify.execute(user, "cs_fast_return").await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Confirmed(ReconcileOutcome::Applied));
    let version_after_verify = stack
        .entitlements
        .find_by_user(user)
        .await
        .unwrap()
        .unwrap()
        .version;

    // The webhook arrives later; the grant is already present.
    let payload = checkout_completed("evt_late", created, "cs_fast_return", user);
    assert_eq!(deliver(&stack, &payload).await, ReconcileOutcome::Duplicate);

    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    assert_eq!(record.version, version_after_verify);
    let entry = stack.journal.find_by_event_id("evt_late").await.unwrap().unwrap();
    assert_eq!(entry.outcome, "duplicate");
}

#[tokio::test]
async fn redelivered_event_is_acknowledged_from_the_journal() {
    let stack = stack();
    let user = UserId::new();
    let created = chrono::Utc::now().timestamp();
    let payload = checkout_completed("evt_redeliver", created, "cs_r1", user);

    assert_eq!(deliver(&stack, &payload).await, ReconcileOutcome::Applied);
    let version = stack
        .entitlements
        .find_by_user(user)
        .await
        .unwrap()
        .unwrap()
        .version;

    assert_eq!(deliver(&stack, &payload).await, ReconcileOutcome::Duplicate);
    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    assert_eq!(record.version, version);

    // The journal keeps the first processing's outcome.
    let entry = stack
        .journal
        .find_by_event_id("evt_redeliver")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.outcome, "applied");
}

// ---------------------------------------------------------------------------
// Ordering and the dunning cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_delivery_of_an_older_event_is_discarded() {
    let stack = stack();
    let user = UserId::new();
    let created = chrono::Utc::now().timestamp();

    let grant = checkout_completed("evt_grant", created, "cs_o1", user);
    deliver(&stack, &grant).await;

    // An update the authority emitted before the grant arrives late.
    let stale = subscription_event(
        "evt_stale",
        "customer.subscription.updated",
        created - 600,
        "past_due",
        (created - 86_400 * 30, created),
    );
    assert_eq!(deliver(&stack, &stale).await, ReconcileOutcome::Stale);

    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    assert_eq!(
        record.subscription.as_ref().unwrap().status,
        SubscriptionStatus::Active
    );
    let entry = stack.journal.find_by_event_id("evt_stale").await.unwrap().unwrap();
    assert_eq!(entry.outcome, "stale");
}

#[tokio::test]
async fn failed_renewal_then_recovery_round_trips_through_past_due() {
    let stack = stack();
    let user = UserId::new();
    let created = chrono::Utc::now().timestamp();

    deliver(&stack, &checkout_completed("evt_d1", created, "cs_d1", user)).await;
    let period_end_before = stack
        .entitlements
        .find_by_user(user)
        .await
        .unwrap()
        .unwrap()
        .subscription
        .as_ref()
        .unwrap()
        .period_end;

    // Renewal fails: past due, but the paid-for period is kept.
    let failed = invoice_event(
        "evt_d2",
        "invoice.payment_failed",
        created + 60,
        (created, created + 86_400 * 30),
    );
    assert_eq!(deliver(&stack, &failed).await, ReconcileOutcome::Applied);
    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    let sub = record.subscription.as_ref().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::PastDue);
    assert_eq!(sub.period_end, period_end_before);
    assert!(record.has_access(Timestamp::now()));

    // Retry settles: back to active with the next period.
    let new_end = created + 86_400 * 60;
    let paid = invoice_event(
        "evt_d3",
        "invoice.paid",
        created + 120,
        (created + 86_400 * 30, new_end),
    );
    assert_eq!(deliver(&stack, &paid).await, ReconcileOutcome::Applied);
    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    let sub = record.subscription.as_ref().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.period_end.as_unix_secs(), new_end);
}

#[tokio::test]
async fn deleted_subscription_loses_access() {
    let stack = stack();
    let user = UserId::new();
    let created = chrono::Utc::now().timestamp();

    deliver(&stack, &checkout_completed("evt_x1", created, "cs_x1", user)).await;

    let deleted = subscription_event(
        "evt_x2",
        "customer.subscription.deleted",
        created + 600,
        "canceled",
        (created, created + 86_400 * 30),
    );
    assert_eq!(deliver(&stack, &deleted).await, ReconcileOutcome::Applied);

    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    assert_eq!(
        record.subscription.as_ref().unwrap().status,
        SubscriptionStatus::Expired
    );
    assert!(!record.has_access(Timestamp::now()));
}

// ---------------------------------------------------------------------------
// Gifts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gift_purchase_validation_and_redemption() {
    let stack = stack();
    let buyer = UserId::new();
    let recipient = UserId::new();
    let created = chrono::Utc::now().timestamp();

    // Gifting requires an active subscription of the buyer's own.
    deliver(
        &stack,
        &checkout_completed("evt_buyer_sub", created, "cs_buyer_sub", buyer),
    )
    .await;

    let session = stack
        .checkout
        .execute(
            buyer,
            "buyer@example.test",
            CheckoutKind::Gift {
                plan_ref: PlanRef::try_from("premium").unwrap(),
                billing_cycle: BillingCycle::Monthly,
            },
        )
        .await
        .unwrap();
    let code = session.gift_code.unwrap();

    // The purchase settles at the authority.
    let mut metadata = HashMap::new();
    metadata.insert("purchase_kind".to_string(), "gift".to_string());
    metadata.insert("user_id".to_string(), buyer.to_string());
    metadata.insert("gift_code".to_string(), code.clone());
    stack.gateway.seed_session(SessionObject {
        id: session.session_ref.clone(),
        payment_status: "paid".to_string(),
        customer: Some("cus_buyer".to_string()),
        subscription: None,
        metadata: metadata.clone(),
    });

    // The completion webhook carries no entitlement; value moves at
    // redemption.
    let payload = json!({
        "id": "evt_gift_1",
        "type": "checkout.session.completed",
        "created": created,
        "data": {
            "object": {
                "id": session.session_ref,
                "payment_status": "paid",
                "customer": "cus_buyer",
                "metadata": metadata
            }
        },
        "livemode": false
    })
    .to_string();
    assert_eq!(deliver(&stack, &payload).await, ReconcileOutcome::Ignored);
    let buyer_record = stack.entitlements.find_by_user(buyer).await.unwrap().unwrap();
    assert!(!buyer_record.subscription.as_ref().unwrap().is_gift);

    // The recipient checks the code, then redeems it.
    let view = stack.gifts.validate(&code).await.unwrap();
    assert_eq!(view.plan_name, "Premium");
    assert_eq!(view.duration_days, 30);

    let redeemed = stack.gifts.redeem(recipient, &code).await.unwrap();
    assert_eq!(redeemed.duration_days, 30);

    let record = stack
        .entitlements
        .find_by_user(recipient)
        .await
        .unwrap()
        .unwrap();
    let sub = record.subscription.as_ref().unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.is_gift);
    assert_eq!(sub.gift_code_used.as_deref(), Some(code.as_str()));

    // The buyer sees the redeemed code in their list.
    let purchased = stack.gifts.list_purchased(buyer).await.unwrap();
    assert_eq!(purchased.len(), 1);
    assert_eq!(purchased[0].status, GiftCodeStatus::Redeemed);
    assert_eq!(purchased[0].redeemed_by, Some(recipient));
}

#[tokio::test]
async fn gift_extends_an_active_subscription_from_its_period_end() {
    let stack = stack();
    let recipient = UserId::new();
    let created = chrono::Utc::now().timestamp();

    // Existing paid subscription with 20 days left.
    stack.gateway.seed_subscription(SubscriptionObject {
        id: "sub_it".to_string(),
        customer: "cus_it".to_string(),
        status: "active".to_string(),
        current_period_start: created,
        current_period_end: created + 86_400 * 20,
        cancel_at_period_end: false,
    });
    deliver(
        &stack,
        &checkout_completed("evt_g1", created, "cs_g1", recipient),
    )
    .await;

    // A paid gift code for the same plan.
    let gift = GiftCode::new(
        "EXTN-EXTN-EXTN".to_string(),
        PlanRef::try_from("premium").unwrap(),
        BillingCycle::Monthly,
        UserId::new(),
        "cs_gift_paid".to_string(),
        Timestamp::now(),
    );
    stack.gift_codes.insert(&gift).await.unwrap();
    stack.gateway.seed_session(SessionObject {
        id: "cs_gift_paid".to_string(),
        payment_status: "paid".to_string(),
        customer: None,
        subscription: None,
        metadata: HashMap::new(),
    });

    let redeemed = stack.gifts.redeem(recipient, "EXTN-EXTN-EXTN").await.unwrap();

    // 20 days remaining plus the 30-day gift.
    assert_eq!(
        redeemed.period_end.as_unix_secs(),
        created + 86_400 * (20 + 30)
    );
    let record = stack
        .entitlements
        .find_by_user(recipient)
        .await
        .unwrap()
        .unwrap();
    let sub = record.subscription.as_ref().unwrap();
    assert_eq!(sub.period_end.as_unix_secs(), created + 86_400 * 50);
    assert!(sub.is_gift);
}

#[tokio::test]
async fn concurrent_redemption_has_exactly_one_winner() {
    let stack = stack();
    let gift = GiftCode::new(
        "RACE-RACE-RACE".to_string(),
        PlanRef::try_from("premium").unwrap(),
        BillingCycle::Monthly,
        UserId::new(),
        "cs_race".to_string(),
        Timestamp::now(),
    );
    stack.gift_codes.insert(&gift).await.unwrap();
    stack.gateway.seed_session(SessionObject {
        id: "cs_race".to_string(),
        payment_status: "paid".to_string(),
        customer: None,
        subscription: None,
        metadata: HashMap::new(),
    });

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gifts = stack.gifts.clone();
        let user = UserId::new();
        handles.push(tokio::spawn(async move {
            (user, gifts.redeem(user, "RACE-RACE-RACE").await)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (user, result) = handle.await.unwrap();
        match result {
            Ok(_) => winners.push(user),
            Err(EntitlementError::CodeAlreadyRedeemed) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(winners.len(), 1);

    // Only the winner holds the grant.
    let stored = stack
        .gift_codes
        .find_by_code("RACE-RACE-RACE")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, GiftCodeStatus::Redeemed);
    assert_eq!(stored.redeemed_by, Some(winners[0]));
    let record = stack
        .entitlements
        .find_by_user(winners[0])
        .await
        .unwrap()
        .unwrap();
    assert!(record.subscription.is_some());
}

// ---------------------------------------------------------------------------
// Courses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn owned_course_cannot_be_bought_again() {
    let stack = stack();
    let user = UserId::new();
    let course = CourseId::new();
    let created = chrono::Utc::now().timestamp();

    let payload = json!({
        "id": "evt_course_1",
        "type": "checkout.session.completed",
        "created": created,
        "data": {
            "object": {
                "id": "cs_course_1",
                "payment_status": "paid",
                "customer": "cus_it",
                "metadata": {
                    "purchase_kind": "course",
                    "user_id": user.to_string(),
                    "course_id": course.to_string()
                }
            }
        },
        "livemode": false
    })
    .to_string();
    assert_eq!(deliver(&stack, &payload).await, ReconcileOutcome::Applied);

    let record = stack.entitlements.find_by_user(user).await.unwrap().unwrap();
    assert!(record.has_course(&course));

    // A second checkout for the same course is refused outright.
    let result = stack
        .checkout
        .execute(
            user,
            "buyer@example.test",
            CheckoutKind::Course {
                course_id: course,
                title: "Knife Skills".to_string(),
                amount_cents: 4900,
                currency: "usd".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(EntitlementError::AlreadyPurchased)));
    assert!(stack.gateway.created_sessions().is_empty());
}
