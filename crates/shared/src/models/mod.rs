//! Domain models shared across crates

pub mod payment;
pub mod tenant;

pub use payment::{
    InsertOutcome, NewPaymentRecord, PaymentMode, PaymentRecord, PaymentSettings, PaymentStatus,
};
pub use tenant::{
    NewTenant, Restriction, Tenant, TenantId, TenantSlug, TenantStatus, MAX_SLUG_LEN,
    RESERVED_SLUGS,
};
