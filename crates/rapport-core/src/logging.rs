//! Structured logging field name constants for rapport.
//!
//! Every crate uses these names for `tracing` fields so log aggregation can
//! query by the same keys across the engine and the database layer.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Storage failure surfaced to the caller |
//! | WARN  | Rejected deletion, ignored configuration override |
//! | INFO  | Schema mutations (type/field create, update, delete) |
//! | DEBUG | Decision points (option growth, decode fallback, usage guard) |
//! | TRACE | Per-field iteration during projection and save |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event. Values: "core", "database"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "types", "fields", "values", "projection", "codec", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create_type", "delete_type", "ensure_option", "save_values"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tenant the schema object belongs to.
pub const TEAM_ID: &str = "team_id";

/// Type UUID being operated on.
pub const TYPE_ID: &str = "type_id";

/// Field definition UUID being operated on.
pub const FIELD_ID: &str = "field_id";

/// Contact/company/employee UUID whose values are read or written.
pub const ENTITY_ID: &str = "entity_id";

/// Entity kind ("contact", "company", "employee").
pub const ENTITY_KIND: &str = "entity_kind";

/// Field kind of the definition involved.
pub const FIELD_KIND: &str = "field_kind";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or items returned.
pub const RESULT_COUNT: &str = "result_count";

/// Number of field values written by a save.
pub const VALUE_COUNT: &str = "value_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";
