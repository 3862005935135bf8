//! Names of every metric the workspace records.

/// Sessions created (counter).
pub const SESSIONS_OPENED_TOTAL: &str = "tether_sessions_opened_total";
/// Sessions closed (counter).
pub const SESSIONS_CLOSED_TOTAL: &str = "tether_sessions_closed_total";
/// Open sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "tether_sessions_active";
/// Session lifetime (histogram).
pub const SESSION_DURATION_SECONDS: &str = "tether_session_duration_seconds";
/// Messages accepted by intake (counter).
pub const MESSAGES_INBOUND_TOTAL: &str = "tether_messages_inbound_total";
/// Messages emitted on push streams (counter).
pub const MESSAGES_OUTBOUND_TOTAL: &str = "tether_messages_outbound_total";
/// Intake requests refused (counter, labels: reason).
pub const INTAKE_REJECTED_TOTAL: &str = "tether_intake_rejected_total";
/// Inbound messages dropped at close (counter).
pub const INBOUND_DISCARDED_TOTAL: &str = "tether_inbound_discarded_total";
/// Push streams refused at the session limit (counter).
pub const PUSH_REJECTED_TOTAL: &str = "tether_push_rejected_total";
/// RPC requests (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "tether_rpc_requests_total";
/// RPC errors (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "tether_rpc_errors_total";
/// RPC handler latency (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "tether_rpc_request_duration_seconds";
