use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub catalog_path: String,
    pub shop_name: String,
    pub shop_timezone: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub google_api_token: String,
    pub calendar_id: String,
    pub session_ttl_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "shopchat.db".to_string()),
            catalog_path: env::var("CATALOG_PATH")
                .unwrap_or_else(|_| "knowledge_base.yaml".to_string()),
            shop_name: env::var("SHOP_NAME")
                .unwrap_or_else(|_| "Austin Hybrid Battery".to_string()),
            shop_timezone: env::var("SHOP_TIMEZONE")
                .unwrap_or_else(|_| "America/Chicago".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            google_api_token: env::var("GOOGLE_API_TOKEN").unwrap_or_default(),
            calendar_id: env::var("CALENDAR_ID").unwrap_or_else(|_| "primary".to_string()),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
        }
    }
}
