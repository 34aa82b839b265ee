//! Stop enforcement configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Stop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopsConfig {
    /// Trail distance used when an entry names no strategy (0.02 = 2%).
    #[serde(default = "default_trail_distance")]
    pub default_trail_distance: Decimal,
}

impl Default for StopsConfig {
    fn default() -> Self {
        Self {
            default_trail_distance: default_trail_distance(),
        }
    }
}

fn default_trail_distance() -> Decimal {
    dec!(0.02)
}
