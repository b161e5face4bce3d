use clap::Parser;

/// Process-level settings (`spec.md` §6 table, plus the ambient transport
/// fields an `axum` binding needs), loaded via `clap::Parser` with env-var
/// fallbacks the way the teacher's `file_host::Config` is built.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct GatewayConfig {
	/// Address the WebSocket/HTTP listener binds to.
	#[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
	pub bind_addr: String,

	/// Use JSON formatting for tracing output.
	#[arg(long, env = "LOG_JSON", default_value_t = false)]
	pub log_json: bool,

	/// `tracing_subscriber::EnvFilter` directive string.
	#[arg(long, env = "RUST_LOG")]
	pub rust_log: Option<String>,

	/// Run a one-shot health probe against a running instance and exit,
	/// instead of starting the server (mirrors the teacher's `--health-check`
	/// early-exit flag).
	#[arg(long, env = "HEALTH_CHECK", default_value_t = false)]
	pub health_check: bool,

	#[arg(long, env = "HEALTH_CHECK_HOST", default_value = "127.0.0.1")]
	pub health_check_host: String,

	#[arg(long, env = "HEALTH_CHECK_PORT", default_value_t = 3000)]
	pub health_check_port: u16,

	/// `maxNumberOfClientsPerDocument` (`spec.md` §6).
	#[arg(long, env = "MAX_CLIENTS_PER_DOCUMENT", default_value_t = 1_000_000)]
	pub max_clients_per_document: u64,

	/// `maxTokenLifetimeSec` (`spec.md` §6).
	#[arg(long, env = "MAX_TOKEN_LIFETIME_SEC", default_value_t = 3600)]
	pub max_token_lifetime_sec: i64,

	/// `isTokenExpiryEnabled` (`spec.md` §6).
	#[arg(long, env = "TOKEN_EXPIRY_ENABLED", default_value_t = false)]
	pub token_expiry_enabled: bool,

	/// Token-bucket capacity for `connectThrottler`; absent disables connect
	/// throttling entirely (the guard becomes a no-op, per `spec.md` §4.3).
	#[arg(long, env = "CONNECT_THROTTLE_CAPACITY")]
	pub connect_throttle_capacity: Option<u32>,

	#[arg(long, env = "CONNECT_THROTTLE_PERIOD_SECS", default_value_t = 60)]
	pub connect_throttle_period_secs: u64,

	/// Token-bucket capacity for `submitOpThrottler`; absent disables it.
	#[arg(long, env = "SUBMIT_OP_THROTTLE_CAPACITY")]
	pub submit_op_throttle_capacity: Option<u32>,

	#[arg(long, env = "SUBMIT_OP_THROTTLE_PERIOD_SECS", default_value_t = 1)]
	pub submit_op_throttle_period_secs: u64,
}

impl GatewayConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::parse()
	}
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self::parse_from::<_, String>([])
	}
}
