use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use sowama_engine::EngineConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub mint_poll_secs: u64,
    pub social_api_url: Option<String>,
    pub chain_api_url: Option<String>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("SOWAMA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("SOWAMA_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let defaults = EngineConfig::default();
        let lookback_hours: i64 = parse(&get, "SOWAMA_CLAIM_LOOKBACK_HOURS", 72)?;
        let check_timeout_secs: u64 = parse(&get, "SOWAMA_CHECK_TIMEOUT_SECS", 60)?;
        let initial_token_value: f64 = parse(
            &get,
            "SOWAMA_INITIAL_TOKEN_VALUE",
            defaults.initial_token_value,
        )?;
        let submit_horizon_secs: u64 = parse(
            &get,
            "SOWAMA_MINT_SUBMIT_HORIZON_SECS",
            defaults.mint_submit_horizon.as_secs(),
        )?;
        if lookback_hours <= 0 || check_timeout_secs == 0 || submit_horizon_secs == 0 {
            bail!("claim durations must be positive");
        }
        let nft_bonus_points: i64 =
            parse(&get, "SOWAMA_NFT_CLAIM_BONUS", defaults.nft_bonus_points)?;
        if nft_bonus_points < 0 {
            bail!("SOWAMA_NFT_CLAIM_BONUS must not be negative, got {}", nft_bonus_points);
        }

        Ok(Self {
            host: get("SOWAMA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&get, "SOWAMA_PORT", 3000)?,
            db_path: get("SOWAMA_DB_PATH").unwrap_or_else(|| "sowama.db".into()),
            jwt_secret,
            mint_poll_secs: parse::<u64>(&get, "SOWAMA_MINT_POLL_SECS", 15)?.max(1),
            social_api_url: get("SOWAMA_SOCIAL_API_URL"),
            chain_api_url: get("SOWAMA_CHAIN_API_URL"),
            engine: EngineConfig {
                initial_token_value,
                nft_bonus_points,
                claim_lookback: chrono::Duration::hours(lookback_hours),
                check_timeout: Duration::from_secs(check_timeout_secs),
                mention_tag: get("SOWAMA_MENTION_TAG").unwrap_or(defaults.mention_tag),
                mint_submit_horizon: Duration::from_secs(submit_horizon_secs),
            },
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("SOWAMA_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, "sowama.db");
        assert_eq!(config.engine.nft_bonus_points, 50);
        assert_eq!(config.engine.mention_tag, "@SowamaAgent");
        assert_eq!(config.engine.claim_lookback, chrono::Duration::hours(72));
        assert_eq!(config.engine.mint_submit_horizon, Duration::from_secs(600));
        assert!(config.social_api_url.is_none());
    }

    #[test]
    fn placeholder_secret_is_refused() {
        assert!(config(&[]).is_err());
        assert!(config(&[("SOWAMA_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = config(&[("SOWAMA_JWT_SECRET", "s"), ("SOWAMA_PORT", "http")]).unwrap_err();
        assert!(format!("{:#}", err).contains("SOWAMA_PORT"));
    }

    #[test]
    fn negative_bonus_is_refused() {
        let err =
            config(&[("SOWAMA_JWT_SECRET", "s"), ("SOWAMA_NFT_CLAIM_BONUS", "-5")]).unwrap_err();
        assert!(format!("{:#}", err).contains("SOWAMA_NFT_CLAIM_BONUS"));
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("SOWAMA_JWT_SECRET", "s"),
            ("SOWAMA_NFT_CLAIM_BONUS", "0"),
            ("SOWAMA_CHECK_TIMEOUT_SECS", "5"),
            ("SOWAMA_CHAIN_API_URL", "http://bridge:8545"),
        ])
        .unwrap();
        assert_eq!(config.engine.nft_bonus_points, 0);
        assert_eq!(config.engine.check_timeout, Duration::from_secs(5));
        assert_eq!(config.chain_api_url.as_deref(), Some("http://bridge:8545"));
    }
}
