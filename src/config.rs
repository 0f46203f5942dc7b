use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub production: bool,

    pub sepay_api_key: Option<String>,
    pub casso_webhook_secret: Option<String>,

    pub bank_code: String,
    pub bank_account_number: String,
    pub bank_account_name: String,

    pub notify_webhook_url: Option<String>,

    pub max_pending_intents: i64,
    pub intent_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
    pub webhook_retention_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let production = env::var("PAYREC_ENV")
            .map(|v| v == "production" || v == "prod")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "payrec.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "payrec_audit.db".to_string()),
            production,
            sepay_api_key: env::var("SEPAY_API_KEY").ok().filter(|s| !s.is_empty()),
            casso_webhook_secret: env::var("CASSO_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            bank_code: env::var("BANK_CODE").unwrap_or_else(|_| "970422".to_string()),
            bank_account_number: env::var("BANK_ACCOUNT_NUMBER")
                .unwrap_or_else(|_| "0000000000".to_string()),
            bank_account_name: env::var("BANK_ACCOUNT_NAME")
                .unwrap_or_else(|_| "PAYREC LTD".to_string()),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            max_pending_intents: env::var("MAX_PENDING_INTENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            intent_ttl_minutes: env::var("INTENT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            webhook_retention_days: env::var("WEBHOOK_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
