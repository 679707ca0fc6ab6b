//! Service configuration
//!
//! Values come from command-line flags or environment variables, with
//! flags taking precedence. Missing required values abort startup.

use clap::Parser;

/// Loyalty points accrual service
#[derive(Parser, Debug, Clone)]
#[command(name = "loyalty")]
pub struct Config {
    /// Listen address
    #[arg(
        short = 'a',
        long = "run-address",
        env = "RUN_ADDRESS",
        default_value = ":8080"
    )]
    pub run_address: String,

    /// PostgreSQL connection string
    #[arg(short = 'd', long = "database-uri", env = "DATABASE_URI")]
    pub database_uri: String,

    /// Accrual service base URL
    #[arg(short = 'r', long = "accrual-address", env = "ACCRUAL_SYSTEM_ADDRESS")]
    pub accrual_address: String,

    /// HMAC secret for auth tokens
    #[arg(
        short = 's',
        long = "jwt-secret",
        env = "JWT_SECRET",
        default_value = "secret"
    )]
    pub jwt_secret: String,
}

impl Config {
    /// Parse configuration from the process arguments and environment.
    pub fn load() -> Self {
        Config::parse()
    }

    /// Address usable by the TCP listener; a bare `:port` binds all
    /// interfaces.
    pub fn bind_address(&self) -> String {
        if self.run_address.starts_with(':') {
            format!("0.0.0.0{}", self.run_address)
        } else {
            self.run_address.clone()
        }
    }
}
