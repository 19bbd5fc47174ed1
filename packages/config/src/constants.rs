// ABOUTME: Environment variable name constants and their defaults
// ABOUTME: Centralized definitions of all environment variable names used across FormPilot

// Anthropic Configuration
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL";

// Assistant Configuration
pub const FORMPILOT_API_URL: &str = "FORMPILOT_API_URL";
pub const FORMPILOT_MAX_TOKENS: &str = "FORMPILOT_MAX_TOKENS";
pub const FORMPILOT_TEMPERATURE: &str = "FORMPILOT_TEMPERATURE";
pub const FORMPILOT_APPLY_POLICY: &str = "FORMPILOT_APPLY_POLICY";

// HTTP Client Configuration
pub const FORMPILOT_HTTP_REQUEST_TIMEOUT_SECS: &str = "FORMPILOT_HTTP_REQUEST_TIMEOUT_SECS";
pub const FORMPILOT_HTTP_CONNECT_TIMEOUT_SECS: &str = "FORMPILOT_HTTP_CONNECT_TIMEOUT_SECS";

// Storage Configuration
pub const FORMPILOT_DATABASE_URL: &str = "FORMPILOT_DATABASE_URL";

// Defaults
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_HTTP_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://formpilot.db?mode=rwc";
