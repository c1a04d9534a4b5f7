mod signature;
mod webhook_payload;

pub use signature::{calculate_signature, confirmation_message, verify_signature};
pub use webhook_payload::{resolve_event_id, Entity, WebhookEnvelope, WebhookEventType, WebhookPayload};
