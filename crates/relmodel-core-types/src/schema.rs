//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names consistent across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Metamodel and instance identifiers
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_PROPERTY_ID: &str = "property_id";
pub const FIELD_INSTANCE_ID: &str = "instance_id";

// Collection sizes
pub const FIELD_CLOSURE_LEN: &str = "closure_len";
pub const FIELD_CLONE_COUNT: &str = "clone_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
