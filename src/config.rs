//! Configuration loader: merges config.toml, .env file, and env vars.

use common::config::DEFAULT_WASHOUT_COEFFICIENT;
use common::{Error, SkywashConfig};
use freshness::CityRegistry;
use std::path::Path;
use tracing::warn;

fn parse_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = parse_u64(raw, env_name)
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

/// Invalid coefficients fall back to the default instead of failing startup.
fn parse_coefficient(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => {
            warn!(
                "Invalid WASHOUT_COEFF value {:?}, falling back to {}",
                raw, DEFAULT_WASHOUT_COEFFICIENT
            );
            DEFAULT_WASHOUT_COEFFICIENT
        }
    }
}

fn validate_config(config: &SkywashConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.waqi_api_token.trim().is_empty() {
        issues.push("waqi_api_token must not be empty".into());
    }
    if !config.waqi_base_url.starts_with("http://") && !config.waqi_base_url.starts_with("https://")
    {
        issues.push("waqi_base_url must be an http(s) URL".into());
    }
    if config.cities_path.is_none() && config.cities.is_empty() {
        issues.push("cities must contain at least one city".into());
    }

    if config.cache.ttl_secs == 0 {
        issues.push("cache.ttl_secs must be > 0".into());
    }

    if config.refresh.concurrency_limit == 0 {
        issues.push("refresh.concurrency_limit must be > 0".into());
    }
    if config.refresh.fetch_timeout_secs == 0 {
        issues.push("refresh.fetch_timeout_secs must be > 0".into());
    }
    if config.refresh.interval_secs == 0 {
        issues.push("refresh.interval_secs must be > 0".into());
    }
    if config.refresh.deadline_secs != 0
        && config.refresh.deadline_secs < config.refresh.fetch_timeout_secs
    {
        issues.push("refresh.deadline_secs must be 0 or >= refresh.fetch_timeout_secs".into());
    }

    if config.rate_limit.requests_per_sec == 0 {
        issues.push("rate_limit.requests_per_sec must be > 0".into());
    }

    if !config.washout.coefficient.is_finite() || config.washout.coefficient <= 0.0 {
        issues.push("washout.coefficient must be a finite number > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load configuration from `.env`, the process environment, and an
/// optional `config.toml` in the working directory.
pub fn load_config() -> Result<SkywashConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }
    load_config_from(Path::new("config.toml"), |key| std::env::var(key).ok())
}

/// Defaults, then `config_path` if it exists, then `env` overrides.
pub fn load_config_from<F>(config_path: &Path, env: F) -> Result<SkywashConfig, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = SkywashConfig::default();

    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    }

    if let Some(token) = env("WAQI_API_TOKEN") {
        config.waqi_api_token = token;
    }
    if let Some(url) = env("WAQI_BASE_URL") {
        config.waqi_base_url = url;
    }
    if let Some(path) = env("CITIES_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            config.cities_path = Some(trimmed.to_string());
        }
    }
    if let Some(raw) = env("CACHE_TTL_SECS") {
        config.cache.ttl_secs = parse_positive_u64(&raw, "CACHE_TTL_SECS")?;
    }
    if let Some(raw) = env("REFRESH_CONCURRENCY") {
        config.refresh.concurrency_limit =
            parse_positive_u64(&raw, "REFRESH_CONCURRENCY")? as usize;
    }
    if let Some(raw) = env("FETCH_TIMEOUT_SECS") {
        config.refresh.fetch_timeout_secs = parse_positive_u64(&raw, "FETCH_TIMEOUT_SECS")?;
    }
    if let Some(raw) = env("REFRESH_DEADLINE_SECS") {
        config.refresh.deadline_secs = parse_u64(&raw, "REFRESH_DEADLINE_SECS")?;
    }
    if let Some(raw) = env("REFRESH_INTERVAL_SECS") {
        config.refresh.interval_secs = parse_positive_u64(&raw, "REFRESH_INTERVAL_SECS")?;
    }
    if let Some(raw) = env("WAQI_REQUESTS_PER_SEC") {
        let parsed = parse_positive_u64(&raw, "WAQI_REQUESTS_PER_SEC")?;
        config.rate_limit.requests_per_sec = u32::try_from(parsed)
            .map_err(|_| Error::Config("WAQI_REQUESTS_PER_SEC is too large".into()))?;
    }
    if let Some(raw) = env("WASHOUT_COEFF") {
        config.washout.coefficient = parse_coefficient(&raw);
    }

    validate_config(&config)?;

    Ok(config)
}

/// Build the city registry from `cities_path` or the inline catalog.
pub fn load_registry(config: &SkywashConfig) -> Result<CityRegistry, Error> {
    match config.cities_path.as_deref() {
        Some(path) => CityRegistry::from_json_file(path),
        None => CityRegistry::new(config.cities.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_file() -> &'static Path {
        Path::new("/nonexistent/skywash/config.toml")
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let cfg = load_config_from(no_file(), env_of(&[])).expect("defaults are valid");
        assert_eq!(cfg.cache.ttl_secs, 3600);
        assert!((cfg.washout.coefficient - 0.08).abs() < 1e-12);
        assert_eq!(cfg.waqi_api_token, "demo");
    }

    #[test]
    fn test_env_overrides() {
        let cfg = load_config_from(
            no_file(),
            env_of(&[
                ("WAQI_API_TOKEN", "secret"),
                ("CACHE_TTL_SECS", "120"),
                ("REFRESH_CONCURRENCY", "2"),
                ("REFRESH_DEADLINE_SECS", "0"),
                ("WASHOUT_COEFF", "0.12"),
            ]),
        )
        .expect("valid overrides");
        assert_eq!(cfg.waqi_api_token, "secret");
        assert_eq!(cfg.cache.ttl_secs, 120);
        assert_eq!(cfg.refresh.concurrency_limit, 2);
        assert_eq!(cfg.refresh.deadline_secs, 0);
        assert!((cfg.washout.coefficient - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_bad_coefficient_falls_back() {
        for raw in ["abc123token", "-1", "NaN", "0"] {
            let cfg = load_config_from(no_file(), env_of(&[("WASHOUT_COEFF", raw)]))
                .expect("coefficient falls back instead of failing");
            assert!((cfg.washout.coefficient - 0.08).abs() < 1e-12, "{raw}");
        }
    }

    #[test]
    fn test_bad_integer_is_config_error() {
        let err = load_config_from(no_file(), env_of(&[("CACHE_TTL_SECS", "an hour")]))
            .expect_err("non-numeric ttl");
        assert!(matches!(err, Error::Config(_)));

        let err = load_config_from(no_file(), env_of(&[("REFRESH_CONCURRENCY", "0")]))
            .expect_err("zero concurrency");
        assert!(err.to_string().contains("REFRESH_CONCURRENCY"));
    }

    #[test]
    fn test_toml_file_then_env() {
        let dir = std::env::temp_dir().join(format!("skywash-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
waqi_api_token = "from-file"

[cache]
ttl_secs = 900

[refresh]
concurrency_limit = 4

[[cities]]
name = "Delhi"
latitude = 28.6139
longitude = 77.2090
region = "South Asia"
population = 32900000
baseline_pm25 = 98.6
"#,
        )
        .expect("write config");

        let cfg = load_config_from(&path, env_of(&[("WAQI_API_TOKEN", "from-env")]))
            .expect("file config is valid");
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(cfg.waqi_api_token, "from-env");
        assert_eq!(cfg.cache.ttl_secs, 900);
        assert_eq!(cfg.refresh.concurrency_limit, 4);
        assert_eq!(cfg.refresh.fetch_timeout_secs, 10);
        assert_eq!(cfg.cities.len(), 1);

        let registry = load_registry(&cfg).expect("inline catalog");
        assert!(registry.contains("Delhi"));
    }

    #[test]
    fn test_validation_collects_all_issues() {
        let mut cfg = SkywashConfig::default();
        cfg.cache.ttl_secs = 0;
        cfg.rate_limit.requests_per_sec = 0;
        cfg.waqi_base_url = "ftp://nope".into();
        let msg = validate_config(&cfg).expect_err("invalid").to_string();
        assert!(msg.contains("cache.ttl_secs"));
        assert!(msg.contains("rate_limit.requests_per_sec"));
        assert!(msg.contains("waqi_base_url"));
    }
}
