// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Payment Reconciliation
//!
//! Tests boundary conditions and race conditions in:
//! - Signature verification (RECON-S01 to RECON-S03)
//! - Tenant routing and settings (RECON-T01 to RECON-T04)
//! - Entity binding (RECON-E01 to RECON-E03)
//! - Provider verification (RECON-P01 to RECON-P04)
//! - Idempotency and concurrency (RECON-I01 to RECON-I04)
//! - Side effects (RECON-X01 to RECON-X04)

#[cfg(test)]
mod support {
    use async_trait::async_trait;
    use campus_shared::{
        InMemoryCache, InMemoryTenantDirectory, InMemoryTenantStore, NewTenant, PaymentMode,
        PaymentRecord, PaymentSettings, ScopeManager, Tenant, TenantDirectory, TenantSlug,
        TenantStore,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use time::OffsetDateTime;

    use crate::gateway::{
        GatewayError, InitializeRequest, PaymentGateway, ProviderSession, TransactionStatus,
        VerifiedTransaction,
    };
    use crate::notify::{NotifyError, PaymentNotifier};
    use crate::signature;
    use crate::webhooks::WebhookReconciler;

    pub const WEBHOOK_SECRET: &[u8] = b"whk_platform_secret";
    pub const GREENWOOD_STUDENT: i64 = 42;
    pub const GREENWOOD_CLASS: i64 = 3;
    pub const RIVERSIDE_STUDENT: i64 = 77;

    /// Gateway fake that counts verify calls
    pub struct CountingGateway {
        pub verify_calls: AtomicUsize,
        pub secrets_seen: Mutex<Vec<String>>,
        pub status: Mutex<TransactionStatus>,
        pub amount_minor: AtomicI64,
        pub failing: AtomicBool,
    }

    impl CountingGateway {
        pub fn new() -> Self {
            Self {
                verify_calls: AtomicUsize::new(0),
                secrets_seen: Mutex::new(Vec::new()),
                status: Mutex::new(TransactionStatus::Success),
                amount_minor: AtomicI64::new(500_000),
                failing: AtomicBool::new(false),
            }
        }

        pub fn calls(&self) -> usize {
            self.verify_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn verify(
            &self,
            secret: &str,
            reference: &str,
        ) -> Result<VerifiedTransaction, GatewayError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.secrets_seen.lock().unwrap().push(secret.to_string());
            // Let concurrent deliveries interleave
            tokio::task::yield_now().await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(GatewayError::Http { status: 503 });
            }
            let status = self.status.lock().unwrap().clone();
            Ok(VerifiedTransaction {
                status: status.clone(),
                amount_minor: self.amount_minor.load(Ordering::SeqCst),
                currency: "ngn".to_string(),
                provider_transaction_id: "4099260516".to_string(),
                paid_at: Some(OffsetDateTime::now_utc()),
                raw: json!({"reference": reference, "status": status.as_str()}),
            })
        }

        async fn initialize(
            &self,
            _secret: &str,
            _request: &InitializeRequest,
        ) -> Result<ProviderSession, GatewayError> {
            Err(GatewayError::Rejected("not used".to_string()))
        }
    }

    #[derive(Default)]
    pub struct CountingNotifier {
        pub sent: AtomicUsize,
        pub failing: AtomicBool,
    }

    impl CountingNotifier {
        pub fn count(&self) -> usize {
            self.sent.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentNotifier for CountingNotifier {
        async fn notify_payment(
            &self,
            _tenant: &Tenant,
            _payment: &PaymentRecord,
        ) -> Result<(), NotifyError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotifyError::Http(500));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub struct Harness {
        pub reconciler: Arc<WebhookReconciler>,
        pub gateway: Arc<CountingGateway>,
        pub notifier: Arc<CountingNotifier>,
        pub store: Arc<InMemoryTenantStore>,
        pub cache: Arc<InMemoryCache>,
        pub scopes: ScopeManager,
        pub greenwood: Tenant,
        pub riverside: Tenant,
    }

    async fn tenant(
        directory: &InMemoryTenantDirectory,
        store: &InMemoryTenantStore,
        slug: &str,
        mode: PaymentMode,
    ) -> Tenant {
        let tenant = directory
            .insert_active(NewTenant {
                slug: TenantSlug::parse(slug).unwrap(),
                name: format!("{} school", slug),
                contact_email: format!("bursar@{}.example", slug),
            })
            .await
            .unwrap();
        store
            .save_payment_settings(
                tenant.id,
                &PaymentSettings {
                    mode,
                    provider_secret: Some(format!("sk_test_{}", slug)),
                    currency: "NGN".to_string(),
                },
            )
            .await
            .unwrap();
        tenant
    }

    pub async fn harness() -> Harness {
        let directory = Arc::new(InMemoryTenantDirectory::new());
        let store = Arc::new(InMemoryTenantStore::new());
        let cache = Arc::new(InMemoryCache::new());

        let greenwood = tenant(&directory, &store, "greenwood", PaymentMode::Automatic).await;
        let riverside = tenant(&directory, &store, "riverside", PaymentMode::Automatic).await;
        tenant(&directory, &store, "hillcrest", PaymentMode::Manual).await;
        directory
            .register(NewTenant {
                slug: TenantSlug::parse("newschool").unwrap(),
                name: "New School".to_string(),
                contact_email: "office@newschool.example".to_string(),
            })
            .await
            .unwrap();

        store.add_student(greenwood.id, GREENWOOD_STUDENT).await;
        store.add_class(greenwood.id, GREENWOOD_CLASS).await;
        store.add_student(riverside.id, RIVERSIDE_STUDENT).await;

        let scopes = ScopeManager::new(store.clone(), cache.clone());
        let gateway = Arc::new(CountingGateway::new());
        let notifier = Arc::new(CountingNotifier::default());
        let reconciler = Arc::new(WebhookReconciler::new(
            WEBHOOK_SECRET,
            directory.clone(),
            scopes.clone(),
            gateway.clone(),
            notifier.clone(),
        ));

        Harness {
            reconciler,
            gateway,
            notifier,
            store,
            cache,
            scopes,
            greenwood,
            riverside,
        }
    }

    pub fn charge_body(slug: &str, reference: &str, metadata: serde_json::Value) -> Vec<u8> {
        let mut metadata = metadata;
        metadata["school_subdomain"] = json!(slug);
        json!({
            "event": "charge.success",
            "data": {
                "id": 4099260516u64,
                "reference": reference,
                "amount": 500000,
                "currency": "NGN",
                "metadata": metadata
            }
        })
        .to_string()
        .into_bytes()
    }

    pub fn greenwood_body() -> Vec<u8> {
        charge_body("greenwood", "abc123", json!({"student_id": GREENWOOD_STUDENT}))
    }

    pub async fn recorded(h: &Harness, reference: &str) -> PaymentRecord {
        h.store
            .find_payment(h.greenwood.id, reference)
            .await
            .unwrap()
            .expect("payment should be recorded")
    }

    pub fn sign(body: &[u8]) -> String {
        signature::sign(WEBHOOK_SECRET, body)
    }
}

#[cfg(test)]
mod signature_tests {
    use super::support::*;
    use crate::webhooks::ReconcileError;

    // =========================================================================
    // RECON-S01: One byte changed in the signature - 401, no gateway call
    // =========================================================================
    #[tokio::test]
    async fn test_tampered_signature_rejected_before_any_work() {
        let h = harness().await;
        let body = greenwood_body();
        let mut sig = sign(&body).into_bytes();
        let last = sig.len() - 1;
        sig[last] = if sig[last] == b'0' { b'1' } else { b'0' };
        let sig = String::from_utf8(sig).unwrap();

        let err = h.reconciler.reconcile(&body, Some(&sig)).await.unwrap_err();

        assert!(matches!(err, ReconcileError::SignatureInvalid));
        assert_eq!(err.status_code(), 401);
        assert_eq!(h.gateway.calls(), 0, "Gateway must not be called");
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 0);
    }

    // =========================================================================
    // RECON-S02: Missing signature header
    // =========================================================================
    #[tokio::test]
    async fn test_missing_signature_rejected() {
        let h = harness().await;
        let err = h
            .reconciler
            .reconcile(&greenwood_body(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::SignatureInvalid));
        assert_eq!(h.gateway.calls(), 0);
    }

    // =========================================================================
    // RECON-S03: Body modified after signing (amount bumped)
    // =========================================================================
    #[tokio::test]
    async fn test_modified_body_rejected() {
        let h = harness().await;
        let body = greenwood_body();
        let sig = sign(&body);
        let tampered = String::from_utf8(body)
            .unwrap()
            .replace("500000", "900000")
            .into_bytes();

        let err = h.reconciler.reconcile(&tampered, Some(&sig)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::SignatureInvalid));
        assert_eq!(h.gateway.calls(), 0);
    }
}

#[cfg(test)]
mod routing_tests {
    use super::support::*;
    use crate::webhooks::{ReconcileError, ReconcileOutcome};
    use serde_json::json;

    // =========================================================================
    // RECON-T01: Unknown slug and pending tenant get the same answer
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_and_inactive_tenants_are_indistinguishable() {
        let h = harness().await;
        for slug in ["nosuchschool", "newschool"] {
            let body = charge_body(slug, "abc123", json!({"student_id": 1}));
            let err = h
                .reconciler
                .reconcile(&body, Some(&sign(&body)))
                .await
                .unwrap_err();
            assert!(matches!(err, ReconcileError::TenantNotFound(_)), "slug {}", slug);
            assert_eq!(err.status_code(), 404);
            assert_eq!(err.reason(), "tenant_not_found");
        }
        assert_eq!(h.gateway.calls(), 0);
    }

    // =========================================================================
    // RECON-T02: Manual payment mode - 422, no gateway call
    // =========================================================================
    #[tokio::test]
    async fn test_manual_mode_tenant_rejected() {
        let h = harness().await;
        let body = charge_body("hillcrest", "abc123", json!({"student_id": 1}));
        let err = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::AutomaticPaymentsDisabled(_)));
        assert_eq!(err.status_code(), 422);
        assert_eq!(h.gateway.calls(), 0);
    }

    // =========================================================================
    // RECON-T03: Non-charge events are acknowledged and ignored
    // =========================================================================
    #[tokio::test]
    async fn test_other_events_ignored() {
        let h = harness().await;
        let body = json!({"event": "transfer.success", "data": {"reference": "t1"}})
            .to_string()
            .into_bytes();
        let outcome = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored {
                event: "transfer.success".to_string()
            }
        );
        assert_eq!(h.gateway.calls(), 0);
    }

    // =========================================================================
    // RECON-T04: Signed but malformed payloads - 400
    // =========================================================================
    #[tokio::test]
    async fn test_malformed_payloads() {
        let h = harness().await;
        let bodies = [
            b"not json".to_vec(),
            json!({"event": "charge.success", "data": {"reference": "abc123"}})
                .to_string()
                .into_bytes(),
            json!({
                "event": "charge.success",
                "data": {"metadata": {"school_subdomain": "greenwood", "student_id": 42}}
            })
            .to_string()
            .into_bytes(),
        ];
        for body in bodies {
            let err = h
                .reconciler
                .reconcile(&body, Some(&sign(&body)))
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), 400, "{:?}", err);
        }
        assert_eq!(h.gateway.calls(), 0);
    }
}

#[cfg(test)]
mod entity_binding_tests {
    use super::support::*;
    use crate::webhooks::{ReconcileError, ReconcileOutcome};
    use serde_json::json;

    // =========================================================================
    // RECON-E01: Student id belonging to another tenant - rejected, no record
    // =========================================================================
    #[tokio::test]
    async fn test_cross_tenant_student_rejected() {
        let h = harness().await;
        let body = charge_body("greenwood", "abc123", json!({"student_id": RIVERSIDE_STUDENT}));
        let err = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::EntityMismatch { entity: "student", id: RIVERSIDE_STUDENT, .. }
        ));
        assert_eq!(err.status_code(), 422);
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 0);
        assert_eq!(h.store.payment_count(h.riverside.id).await, 0);
        assert_eq!(h.notifier.count(), 0);
    }

    // =========================================================================
    // RECON-E02: Valid student, foreign class id - rejected
    // =========================================================================
    #[tokio::test]
    async fn test_unowned_class_rejected() {
        let h = harness().await;
        let body = charge_body(
            "greenwood",
            "abc123",
            json!({"student_id": GREENWOOD_STUDENT, "class_id": 999}),
        );
        let err = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::EntityMismatch { entity: "class", id: 999, .. }
        ));
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 0);
    }

    // =========================================================================
    // RECON-E03: Owned class and student as numeric strings - recorded
    // =========================================================================
    #[tokio::test]
    async fn test_owned_entities_as_strings_accepted() {
        let h = harness().await;
        let body = charge_body(
            "greenwood",
            "abc123",
            json!({"student_id": "42", "class_id": "3"}),
        );
        let outcome = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Recorded { .. }));
        let record = recorded(&h, "abc123").await;
        assert_eq!(record.class_id, Some(GREENWOOD_CLASS));
    }
}

#[cfg(test)]
mod provider_tests {
    use super::support::*;
    use crate::gateway::{GatewayError, TransactionStatus};
    use crate::webhooks::{ReconcileError, ReconcileOutcome};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    // =========================================================================
    // RECON-P01: Verify uses the tenant's own secret
    // =========================================================================
    #[tokio::test]
    async fn test_verify_uses_tenant_secret() {
        let h = harness().await;
        let body = greenwood_body();
        h.reconciler.reconcile(&body, Some(&sign(&body))).await.unwrap();

        let seen = h.gateway.secrets_seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["sk_test_greenwood".to_string()]);
    }

    // =========================================================================
    // RECON-P02: Provider says abandoned - terminal outcome, nothing recorded
    // =========================================================================
    #[tokio::test]
    async fn test_provider_declined_is_terminal() {
        let h = harness().await;
        *h.gateway.status.lock().unwrap() = TransactionStatus::Abandoned;
        let body = greenwood_body();

        let outcome = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::ProviderDeclined {
                reference: "abc123".to_string(),
                status: "abandoned".to_string()
            }
        );
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 0);
    }

    // =========================================================================
    // RECON-P03: Gateway failure - 502, and the redelivery succeeds later
    // =========================================================================
    #[tokio::test]
    async fn test_gateway_failure_then_redelivery() {
        let h = harness().await;
        let body = greenwood_body();
        let sig = sign(&body);

        h.gateway.failing.store(true, Ordering::SeqCst);
        let err = h.reconciler.reconcile(&body, Some(&sig)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Gateway(_)));
        assert_eq!(err.status_code(), 502);
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 0);

        h.gateway.failing.store(false, Ordering::SeqCst);
        let outcome = h.reconciler.reconcile(&body, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Recorded { .. }));
    }

    // =========================================================================
    // RECON-P04: Provider success with a zero amount - rejected, nothing recorded
    // =========================================================================
    #[tokio::test]
    async fn test_non_positive_provider_amount_is_rejected() {
        let h = harness().await;
        let body = greenwood_body();
        let sig = sign(&body);

        for amount in [0, -500] {
            h.gateway.amount_minor.store(amount, Ordering::SeqCst);
            let err = h.reconciler.reconcile(&body, Some(&sig)).await.unwrap_err();
            assert!(matches!(
                err,
                ReconcileError::Gateway(GatewayError::Malformed(_))
            ));
            assert_eq!(err.status_code(), 502);
        }
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 0);
        assert_eq!(h.notifier.count(), 0);

        // A corrected provider answer on redelivery records normally
        h.gateway.amount_minor.store(500_000, Ordering::SeqCst);
        let outcome = h.reconciler.reconcile(&body, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Recorded { .. }));
    }

    // Amount in the payload is ignored in favour of the provider's
    #[tokio::test]
    async fn test_provider_amount_is_recorded() {
        let h = harness().await;
        let mut body: serde_json::Value = serde_json::from_slice(&greenwood_body()).unwrap();
        body["data"]["amount"] = json!(1);
        let body = body.to_string().into_bytes();

        h.reconciler.reconcile(&body, Some(&sign(&body))).await.unwrap();
        let record = recorded(&h, "abc123").await;
        assert_eq!(record.amount_minor, 500_000);
        assert_eq!(record.currency, "NGN");
    }
}

#[cfg(test)]
mod idempotency_tests {
    use super::support::*;
    use crate::webhooks::ReconcileOutcome;
    use campus_shared::current_scope;

    // =========================================================================
    // RECON-I01: greenwood / abc123 / student 42 - one record, receipt RCT-ABC123
    // =========================================================================
    #[tokio::test]
    async fn test_first_delivery_records_payment() {
        let h = harness().await;
        let body = greenwood_body();

        let outcome = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Recorded {
                tenant_id: h.greenwood.id,
                reference: "abc123".to_string(),
                receipt_number: "RCT-ABC123".to_string(),
            }
        );
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 1);
        let record = recorded(&h, "abc123").await;
        assert_eq!(record.student_id, GREENWOOD_STUDENT);
        assert_eq!(record.provider_transaction_id, "4099260516");
        assert!(record.notified_at.is_some());
    }

    // =========================================================================
    // RECON-I02: Exact repeat - 200 AlreadyRecorded, still one record
    // =========================================================================
    #[tokio::test]
    async fn test_repeat_delivery_is_idempotent() {
        let h = harness().await;
        let body = greenwood_body();
        let sig = sign(&body);

        h.reconciler.reconcile(&body, Some(&sig)).await.unwrap();
        let second = h.reconciler.reconcile(&body, Some(&sig)).await.unwrap();

        assert_eq!(
            second,
            ReconcileOutcome::AlreadyRecorded {
                tenant_id: h.greenwood.id,
                reference: "abc123".to_string()
            }
        );
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 1);
        assert_eq!(h.notifier.count(), 1, "Notification must be sent at most once");
    }

    // =========================================================================
    // RECON-I03: 10 concurrent deliveries of one payload - exactly one record
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_record_once() {
        let h = harness().await;
        let body = greenwood_body();
        let sig = sign(&body);
        let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(10));

        let mut handles = vec![];
        for _ in 0..10 {
            let reconciler = h.reconciler.clone();
            let body = body.clone();
            let sig = sig.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                reconciler.reconcile(&body, Some(&sig)).await
            }));
        }

        let mut recorded = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ReconcileOutcome::Recorded { .. } => recorded += 1,
                ReconcileOutcome::AlreadyRecorded { .. } => already += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(already, 9);
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 1);
        assert_eq!(h.notifier.count(), 1);
    }

    // =========================================================================
    // RECON-I04: Same reference for two tenants - independent records
    // =========================================================================
    #[tokio::test]
    async fn test_reference_scoped_per_tenant() {
        let h = harness().await;
        let a = greenwood_body();
        let b = charge_body(
            "riverside",
            "abc123",
            serde_json::json!({"student_id": RIVERSIDE_STUDENT}),
        );

        h.reconciler.reconcile(&a, Some(&sign(&a))).await.unwrap();
        let outcome = h.reconciler.reconcile(&b, Some(&sign(&b))).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Recorded { tenant_id, .. } if tenant_id == h.riverside.id));
        assert_eq!(h.store.payment_count(h.greenwood.id).await, 1);
        assert_eq!(h.store.payment_count(h.riverside.id).await, 1);
    }

    // Scope does not outlive the reconcile call
    #[tokio::test]
    async fn test_no_scope_left_bound() {
        let h = harness().await;
        let body = greenwood_body();
        h.reconciler.reconcile(&body, Some(&sign(&body))).await.unwrap();
        assert!(current_scope().is_err());
        assert!(!h.scopes.is_bound());
    }
}

#[cfg(test)]
mod side_effect_tests {
    use super::support::*;
    use crate::webhooks::{notify_and_mark, ReconcileOutcome};
    use campus_shared::cache::{fee_summary_key, TenantCache};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    // =========================================================================
    // RECON-X01: Fee summary cache for the student is invalidated
    // =========================================================================
    #[tokio::test]
    async fn test_fee_summary_invalidated() {
        let h = harness().await;
        let greenwood_cache = TenantCache::new(h.greenwood.id, h.cache.clone());
        let riverside_cache = TenantCache::new(h.riverside.id, h.cache.clone());
        let key = fee_summary_key(GREENWOOD_STUDENT);
        greenwood_cache.set(&key, "{}", Duration::from_secs(60)).await.unwrap();
        riverside_cache.set(&key, "{}", Duration::from_secs(60)).await.unwrap();

        let body = greenwood_body();
        h.reconciler.reconcile(&body, Some(&sign(&body))).await.unwrap();

        assert_eq!(greenwood_cache.get(&key).await.unwrap(), None);
        assert!(riverside_cache.get(&key).await.unwrap().is_some());
    }

    // =========================================================================
    // RECON-X02: Notifier failure leaves the record unnotified, still 200
    // =========================================================================
    #[tokio::test]
    async fn test_notification_failure_is_fail_open() {
        let h = harness().await;
        h.notifier.failing.store(true, Ordering::SeqCst);
        let body = greenwood_body();

        let outcome = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Recorded { .. }));
        let record = recorded(&h, "abc123").await;
        assert!(record.notified_at.is_none());
    }

    // =========================================================================
    // RECON-X03: Receipt number derived from the reference
    // =========================================================================
    #[tokio::test]
    async fn test_receipt_number_is_deterministic() {
        let h = harness().await;
        let body = charge_body(
            "greenwood",
            "gw-2026-000123-x",
            serde_json::json!({"student_id": GREENWOOD_STUDENT}),
        );
        let outcome = h
            .reconciler
            .reconcile(&body, Some(&sign(&body)))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ReconcileOutcome::Recorded { ref receipt_number, .. } if receipt_number == "RCT-GW20260001"
        ));
    }

    // =========================================================================
    // RECON-X04: Notification is claimed before sending - never sent twice
    // =========================================================================
    #[tokio::test]
    async fn test_notification_claimed_before_send() {
        let h = harness().await;
        h.notifier.failing.store(true, Ordering::SeqCst);
        let body = greenwood_body();
        h.reconciler.reconcile(&body, Some(&sign(&body))).await.unwrap();
        let record = recorded(&h, "abc123").await;
        assert_eq!(h.notifier.count(), 0);

        h.notifier.failing.store(false, Ordering::SeqCst);
        let scope = h.scopes.build_scope(&h.greenwood);
        let (a, b) = tokio::join!(
            notify_and_mark(h.notifier.as_ref(), &scope, &record),
            notify_and_mark(h.notifier.as_ref(), &scope, &record),
        );
        assert!(a ^ b, "exactly one caller should deliver");
        assert_eq!(h.notifier.count(), 1);

        // Already claimed: a later catch-up does not resend
        assert!(!notify_and_mark(h.notifier.as_ref(), &scope, &record).await);
        assert_eq!(h.notifier.count(), 1);
        assert!(recorded(&h, "abc123").await.notified_at.is_some());
    }
}
