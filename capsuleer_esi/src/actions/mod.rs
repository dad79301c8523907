//! Reports derived from one or more ESI endpoints.

pub mod market;
pub mod pi;
pub mod threat;

pub use market::{MarketSpread, market_prices, market_spread};
pub use pi::{
    PiThresholds, PlanetDetail, PlanetStatus, PlanetSummary, parse_pi_status, pi_planet_detail,
    pi_planets, pi_status,
};
pub use threat::{ThreatAssessment, ThreatLevel, score_threat, threat_assessment};
