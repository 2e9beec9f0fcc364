use std::env;

/// Ten years.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    /// `None` issues tokens without an `exp` claim.
    pub token_ttl_hours: Option<i64>,
    pub calendar: Option<GoogleCalendarConfig>,
    pub calendar_timeout_secs: u64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Admin account created at startup when no user holds the email yet.
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct GoogleCalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub calendar_id: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let jwt_secret = env::var("JWT_SECRET")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let token_ttl_hours = match env::var("TOKEN_TTL_HOURS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|e| anyhow::anyhow!("TOKEN_TTL_HOURS={raw:?}: {e}"))?,
            Err(_) => 24,
        };
        if !(0..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            anyhow::bail!("TOKEN_TTL_HOURS must be between 0 and {MAX_TOKEN_TTL_HOURS}, got {token_ttl_hours}");
        }
        let token_ttl_hours = (token_ttl_hours > 0).then_some(token_ttl_hours);

        let calendar_timeout_secs = env::var("CALENDAR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        let bootstrap_admin = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin { email, password })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            bind_addr,
            jwt_secret,
            token_ttl_hours,
            calendar: GoogleCalendarConfig::from_env(),
            calendar_timeout_secs,
            bootstrap_admin,
        })
    }
}

impl GoogleCalendarConfig {
    /// All three OAuth values must be present, otherwise the calendar stays disabled.
    fn from_env() -> Option<Self> {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());

        Some(Self {
            client_id: non_empty("GOOGLE_CLIENT_ID")?,
            client_secret: non_empty("GOOGLE_CLIENT_SECRET")?,
            refresh_token: non_empty("GOOGLE_REFRESH_TOKEN")?,
            calendar_id: non_empty("GOOGLE_CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
        })
    }
}
