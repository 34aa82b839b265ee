//! Bot control plane adapters.

mod http_launcher;

pub use http_launcher::{HttpBotLauncher, UnconfiguredBotControl};
