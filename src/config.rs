//! Run parameters from the environment (optionally via a .env file).

use chrono::NaiveDate;
use eyre::{eyre, Result, WrapErr};

use crate::endpoints::DEFAULT_CONFIG_URL;
use crate::types::Pool;

/// Everything a run needs: which pool, which days, where to bootstrap from.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pool: Pool,
    /// First day replayed, inclusive
    pub start: NaiveDate,
    /// Last day replayed, inclusive
    pub end: NaiveDate,
    pub config_url: String,
}

impl RunConfig {
    /// Read `pool`, `start`, `end` and `config_url` from the environment.
    /// `pool` defaults to "main"; the dates are required.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let pool = std::env::var("pool")
            .unwrap_or_else(|_| "main".to_string())
            .parse::<Pool>()?;
        let start = parse_date(
            &std::env::var("start").map_err(|_| eyre!("start date not set"))?,
        )
        .wrap_err("invalid start date")?;
        let end = parse_date(&std::env::var("end").map_err(|_| eyre!("end date not set"))?)
            .wrap_err("invalid end date")?;
        let config_url =
            std::env::var("config_url").unwrap_or_else(|_| DEFAULT_CONFIG_URL.to_string());

        Ok(Self {
            pool,
            start,
            end,
            config_url,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .wrap_err_with(|| format!("{s:?} is not a YYYY-MM-DD date"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-01-31").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
        );
        assert!(parse_date("31.01.2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }
}
