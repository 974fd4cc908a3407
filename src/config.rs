//! Server configuration.
//!
//! Everything is read from the environment once, in [`Config::from_env`], and
//! validated before the server starts. Components receive the parts they need
//! explicitly; nothing reads the environment after startup.

use std::path::PathBuf;

use thiserror::Error;

use crate::materialize::DuplicateNamePolicy;

pub const DEFAULT_CLICKUP_API_URL: &str = "https://api.clickup.com/api/v2";
pub const DEFAULT_CLICKUP_AUTHORIZE_URL: &str = "https://app.clickup.com/api";
pub const DEFAULT_OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// How API requests are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Dev mode: every request runs as the `dev` user.
    Disabled,
    /// One dashboard password, one user.
    SingleTenant,
    /// Named accounts from `ARCHIE_USERS`.
    MultiUser,
}

/// A login account for multi-user mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 secret for session tokens and OAuth `state` tokens.
    pub jwt_secret: Option<String>,
    pub jwt_ttl_days: i64,
    pub dashboard_password: Option<String>,
    pub users: Vec<UserAccount>,
}

impl AuthConfig {
    pub fn auth_required(&self, dev_mode: bool) -> bool {
        !dev_mode
    }

    pub fn auth_mode(&self, dev_mode: bool) -> AuthMode {
        if dev_mode {
            AuthMode::Disabled
        } else if !self.users.is_empty() {
            AuthMode::MultiUser
        } else {
            AuthMode::SingleTenant
        }
    }
}

/// ClickUp OAuth application and API location.
#[derive(Debug, Clone)]
pub struct ClickUpConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
    pub authorize_url: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub default_model: String,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub stripe_secret_key: String,
    pub api_url: String,
    /// Subscription price sold through Checkout.
    pub price_id: String,
    /// Plan recorded on the profile once Checkout completes.
    pub plan_name: String,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
    pub working_dir: PathBuf,
    /// Externally visible base URL, used to build redirects.
    pub public_url: String,
    pub max_upload_bytes: usize,
    /// Cap on the decompressed `word/document.xml` of an uploaded `.docx`.
    pub max_document_bytes: usize,
    pub auth: AuthConfig,
    pub clickup: ClickUpConfig,
    pub llm: LlmConfig,
    pub billing: Option<BillingConfig>,
    pub supabase: Option<SupabaseConfig>,
    pub duplicate_names: DuplicateNamePolicy,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => 3000,
        };
        let dev_mode = match get("DEV_MODE") {
            Some(raw) => parse_bool("DEV_MODE", &raw)?,
            None => false,
        };
        let working_dir = get("WORKING_DIR")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let public_url = get("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();
        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                name: "MAX_UPLOAD_BYTES",
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let max_document_bytes = match get("MAX_DOCUMENT_BYTES") {
            Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                name: "MAX_DOCUMENT_BYTES",
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_DOCUMENT_BYTES,
        };

        let jwt_ttl_days = match get("JWT_TTL_DAYS") {
            Some(raw) => raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
                name: "JWT_TTL_DAYS",
                reason: e.to_string(),
            })?,
            None => 30,
        };
        let auth = AuthConfig {
            jwt_secret: get("JWT_SECRET"),
            jwt_ttl_days,
            dashboard_password: get("DASHBOARD_PASSWORD"),
            users: match get("ARCHIE_USERS") {
                Some(raw) => parse_users(&raw)?,
                None => Vec::new(),
            },
        };
        if !dev_mode && auth.jwt_secret.is_none() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if auth.auth_mode(dev_mode) == AuthMode::SingleTenant && auth.dashboard_password.is_none()
        {
            return Err(ConfigError::Missing("DASHBOARD_PASSWORD"));
        }

        let clickup = ClickUpConfig {
            client_id: require("CLICKUP_CLIENT_ID")?,
            client_secret: require("CLICKUP_CLIENT_SECRET")?,
            api_url: get("CLICKUP_API_URL")
                .unwrap_or_else(|| DEFAULT_CLICKUP_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            authorize_url: get("CLICKUP_AUTHORIZE_URL")
                .unwrap_or_else(|| DEFAULT_CLICKUP_AUTHORIZE_URL.to_string()),
        };
        validate_url("CLICKUP_API_URL", &clickup.api_url)?;
        validate_url("CLICKUP_AUTHORIZE_URL", &clickup.authorize_url)?;

        let llm = LlmConfig {
            api_key: require("OPENROUTER_API_KEY")?,
            api_url: get("OPENROUTER_API_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_API_URL.to_string()),
            default_model: get("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };
        validate_url("OPENROUTER_API_URL", &llm.api_url)?;

        let billing = match get("STRIPE_SECRET_KEY") {
            Some(key) => Some(BillingConfig {
                stripe_secret_key: key,
                api_url: get("STRIPE_API_URL")
                    .unwrap_or_else(|| DEFAULT_STRIPE_API_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                price_id: require("STRIPE_PRICE_ID")?,
                plan_name: get("STRIPE_PLAN_NAME").unwrap_or_else(|| "pro".to_string()),
            }),
            None => None,
        };
        if let Some(billing) = &billing {
            validate_url("STRIPE_API_URL", &billing.api_url)?;
        }

        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => {
                validate_url("SUPABASE_URL", &url)?;
                Some(SupabaseConfig {
                    url,
                    service_role_key,
                })
            }
            (Some(_), None) => return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("SUPABASE_URL")),
            (None, None) => None,
        };

        let duplicate_names = match get("DUPLICATE_TASK_NAMES").as_deref() {
            None | Some("last-write-wins") => DuplicateNamePolicy::LastWriteWins,
            Some("reject") => DuplicateNamePolicy::Reject,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "DUPLICATE_TASK_NAMES",
                    reason: format!("expected 'reject' or 'last-write-wins', got '{}'", other),
                })
            }
        };

        Ok(Self {
            host,
            port,
            dev_mode,
            working_dir,
            public_url,
            max_upload_bytes,
            max_document_bytes,
            auth,
            clickup,
            llm,
            billing,
            supabase,
            duplicate_names,
        })
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn validate_url(name: &'static str, raw: &str) -> Result<(), ConfigError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

/// Parse `id:username:password` entries separated by commas.
fn parse_users(raw: &str) -> Result<Vec<UserAccount>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(username), Some(password))
                    if !id.is_empty() && !username.is_empty() && !password.is_empty() =>
                {
                    Ok(UserAccount {
                        id: id.to_string(),
                        username: username.to_string(),
                        password: password.to_string(),
                    })
                }
                _ => Err(ConfigError::Invalid {
                    name: "ARCHIE_USERS",
                    reason: format!("expected id:username:password, got '{}'", entry),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("JWT_SECRET", "secret"),
            ("DASHBOARD_PASSWORD", "hunter2"),
            ("CLICKUP_CLIENT_ID", "client"),
            ("CLICKUP_CLIENT_SECRET", "shh"),
            ("OPENROUTER_API_KEY", "sk-or"),
            ("WORKING_DIR", "/tmp/archie"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert!(!config.dev_mode);
        assert_eq!(config.public_url, "http://127.0.0.1:3000");
        assert_eq!(config.clickup.api_url, DEFAULT_CLICKUP_API_URL);
        assert_eq!(config.llm.default_model, DEFAULT_MODEL);
        assert!(config.billing.is_none());
        assert!(config.supabase.is_none());
        assert_eq!(config.duplicate_names, DuplicateNamePolicy::LastWriteWins);
        assert_eq!(config.max_document_bytes, DEFAULT_MAX_DOCUMENT_BYTES);
        assert_eq!(
            config.auth.auth_mode(config.dev_mode),
            AuthMode::SingleTenant
        );
    }

    #[test]
    fn test_missing_clickup_credentials() {
        let mut env = base_env();
        env.remove("CLICKUP_CLIENT_SECRET");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CLICKUP_CLIENT_SECRET")));
    }

    #[test]
    fn test_jwt_secret_required_outside_dev_mode() {
        let mut env = base_env();
        env.remove("JWT_SECRET");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        ));

        env.insert("DEV_MODE", "true");
        let config = load(&env).unwrap();
        assert_eq!(config.auth.auth_mode(true), AuthMode::Disabled);
    }

    #[test]
    fn test_parse_users() {
        let mut env = base_env();
        env.insert("ARCHIE_USERS", "u1:alice:pw1, u2:bob:p:w2");
        let config = load(&env).unwrap();
        assert_eq!(config.auth.users.len(), 2);
        assert_eq!(config.auth.users[1].password, "p:w2");
        assert_eq!(config.auth.auth_mode(false), AuthMode::MultiUser);

        env.insert("ARCHIE_USERS", "broken");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Invalid {
                name: "ARCHIE_USERS",
                ..
            }
        ));
    }

    #[test]
    fn test_supabase_requires_both_values() {
        let mut env = base_env();
        env.insert("SUPABASE_URL", "https://project.supabase.co");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY")
        ));
        env.insert("SUPABASE_SERVICE_ROLE_KEY", "service");
        assert!(load(&env).unwrap().supabase.is_some());
    }

    #[test]
    fn test_billing_needs_price() {
        let mut env = base_env();
        env.insert("STRIPE_SECRET_KEY", "sk_test");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Missing("STRIPE_PRICE_ID")
        ));
        env.insert("STRIPE_PRICE_ID", "price_1");
        let billing = load(&env).unwrap().billing.unwrap();
        assert_eq!(billing.api_url, DEFAULT_STRIPE_API_URL);
        assert_eq!(billing.plan_name, "pro");
    }

    #[test]
    fn test_duplicate_policy() {
        let mut env = base_env();
        env.insert("DUPLICATE_TASK_NAMES", "reject");
        assert_eq!(load(&env).unwrap().duplicate_names, DuplicateNamePolicy::Reject);
        env.insert("DUPLICATE_TASK_NAMES", "sometimes");
        assert!(load(&env).is_err());
    }

    #[test]
    fn test_invalid_port() {
        let mut env = base_env();
        env.insert("PORT", "eighty");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::Invalid { name: "PORT", .. }
        ));
    }
}
