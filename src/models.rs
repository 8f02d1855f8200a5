use serde::{Deserialize, Serialize};

// --- Users ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
    pub created_at: String,
}

/// A user row together with its password hash. Never serialized; the hash
/// stays inside the auth path.
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

// --- Machines ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Machine {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub hostname: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_memory_mb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_disk_gb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_boot_at: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    pub is_enabled: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterMachineRequest {
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterMachineResponse {
    pub machine: Machine,
    /// Returned exactly once; only the SHA-256 hash is stored.
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

/// Mutable system facts an agent may report alongside a sample.
#[derive(Debug, Deserialize, Clone)]
pub struct SystemInfoUpdate {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub kernel: Option<String>,
    #[serde(default)]
    pub cpu_cores: Option<i64>,
    #[serde(default)]
    pub total_memory_mb: Option<i64>,
    #[serde(default)]
    pub total_disk_gb: Option<i64>,
    #[serde(default)]
    pub last_boot_at: Option<String>,
}

// --- Metrics ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsSample {
    pub machine_id: i64,
    pub timestamp: String,
    pub cpu_pct: f64,
    pub mem_used_pct: f64,
    pub disk_used_pct: f64,
    pub net_rx_bytes: i64,
    pub net_tx_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AgentMetricsRequest {
    pub cpu_pct: f64,
    pub mem_used_pct: f64,
    pub disk_used_pct: f64,
    #[serde(default)]
    pub net_rx_bytes: i64,
    #[serde(default)]
    pub net_tx_bytes: i64,
    #[serde(default)]
    pub uptime_seconds: Option<i64>,
    /// Sample time; the server clock is used when the agent omits it.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub system_info: Option<SystemInfoUpdate>,
}

// --- Alert rules & events ---

pub const ALERT_METRICS: [&str; 3] = ["cpu_pct", "mem_used_pct", "disk_used_pct"];
pub const ALERT_COMPARISONS: [&str; 2] = ["above", "below"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    pub metric: String,
    pub comparison: String,
    pub threshold_pct: f64,
    pub trigger_after: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct AlertRuleRequest {
    pub name: String,
    pub metric: String,
    pub comparison: String,
    pub threshold_pct: f64,
    #[serde(default = "default_trigger_after")]
    pub trigger_after: i64,
}

fn default_trigger_after() -> i64 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AlertEvent {
    pub id: i64,
    pub rule_id: i64,
    pub value: f64,
    pub triggered_at: String,
    pub acknowledged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<String>,
}

// --- Notification channels ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Webhook {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub is_active: bool,
    pub failure_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramRecipient {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: String,
    pub is_active: bool,
    pub failure_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTelegramRequest {
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTelegramRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}
