//! Runtime configuration, read from the environment (after `.env`).

use std::str::FromStr;

use anyhow::{Context, Result};

use crate::domain::aggregates::PricingPolicy;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Without one, state lives in memory and is lost on restart.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub nats_url: Option<String>,
    pub pricing: PricingPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = PricingPolicy::default();
        let pricing = PricingPolicy {
            free_shipping_threshold: parse(&lookup, "FREE_SHIPPING_THRESHOLD")?.map(Money::new).unwrap_or(defaults.free_shipping_threshold),
            flat_shipping_cost: parse(&lookup, "FLAT_SHIPPING_COST")?.map(Money::new).unwrap_or(defaults.flat_shipping_cost),
            tax_rate: parse(&lookup, "TAX_RATE")?.unwrap_or(defaults.tax_rate),
        };
        Ok(Self {
            port: parse(&lookup, "PORT")?.unwrap_or(8083),
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
            pricing,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key).map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {key}: {v:?}"))).transpose()
}
