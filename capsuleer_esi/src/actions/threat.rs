use std::fmt;

use capsuleer_core::SolarSystemId;
use serde::Serialize;
use serde_json::Value;

use crate::{
    EsiError, EsiResult,
    query::{EsiQuery, QueryRequest},
};

const KILL_WEIGHT: f64 = 2.0;
const JUMP_WEIGHT: f64 = 0.1;
const PVP_WEIGHT: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 15.0 {
            Self::Low
        } else if score < 40.0 {
            Self::Medium
        } else if score < 80.0 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThreatAssessment {
    pub system_id: SolarSystemId,
    pub ship_kills: u64,
    pub pod_kills: u64,
    pub npc_kills: u64,
    pub jumps: u64,
    pub pvp_kills: u64,
    pub score: f64,
    pub level: ThreatLevel,
}

/// Weighted activity score; NPC kills do not count.
pub fn score_threat(ship_kills: u64, pod_kills: u64, jumps: u64, pvp_kills: u64) -> f64 {
    let score = KILL_WEIGHT * (ship_kills + pod_kills) as f64
        + JUMP_WEIGHT * jumps as f64
        + PVP_WEIGHT * pvp_kills as f64;
    (score * 100.0).round() / 100.0
}

/// `pvp_kills` comes from an external killboard and is supplied by the caller.
pub async fn threat_assessment<Q>(
    esi: &Q,
    system_id: SolarSystemId,
    pvp_kills: u64,
) -> EsiResult<ThreatAssessment>
where
    Q: EsiQuery + ?Sized,
{
    let kills = activity_rows(esi, "/universe/system_kills/").await?;
    let jumps = activity_rows(esi, "/universe/system_jumps/").await?;

    let kills_row = system_row(&kills, system_id);
    let count = |row: Option<&Value>, field: &str| {
        row.and_then(|row| row.get(field))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let ship_kills = count(kills_row, "ship_kills");
    let pod_kills = count(kills_row, "pod_kills");
    let npc_kills = count(kills_row, "npc_kills");
    let jumps = count(system_row(&jumps, system_id), "ship_jumps");

    let score = score_threat(ship_kills, pod_kills, jumps, pvp_kills);
    let level = ThreatLevel::from_score(score);
    log::debug!("system {system_id}: score {score} ({level})");

    Ok(ThreatAssessment {
        system_id,
        ship_kills,
        pod_kills,
        npc_kills,
        jumps,
        pvp_kills,
        score,
        level,
    })
}

/// Systems without activity are simply absent from these lists.
async fn activity_rows<Q>(esi: &Q, endpoint: &str) -> EsiResult<Vec<Value>>
where
    Q: EsiQuery + ?Sized,
{
    match esi.fetch_one(&QueryRequest::get(endpoint)).await? {
        Value::Array(rows) => Ok(rows),
        other => Err(EsiError::UnexpectedBody {
            endpoint: endpoint.to_owned(),
            detail: format!("expected an array of per-system rows, got {other}"),
        }),
    }
}

fn system_row(rows: &[Value], system_id: SolarSystemId) -> Option<&Value> {
    rows.iter().find(|row| {
        row.get("system_id").and_then(Value::as_i64) == Some(i64::from(system_id.0))
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use capsuleer_core::SolarSystemId;
    use serde_json::{Value, json};

    use super::{ThreatLevel, score_threat, threat_assessment};
    use crate::{
        EsiError,
        errors::{ApiError, ApiErrorKind, ApiResult},
        query::{EsiQuery, QueryRequest},
    };

    #[test]
    fn levels_bucket_at_fixed_boundaries() {
        assert_eq!(ThreatLevel::from_score(0.0), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(14.99), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from_score(15.0), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from_score(40.0), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_score(79.9), ThreatLevel::High);
        assert_eq!(ThreatLevel::from_score(80.0), ThreatLevel::Critical);
    }

    #[test]
    fn score_weights_kills_jumps_and_pvp() {
        assert_eq!(score_threat(3, 2, 100, 4), 26.0);
        assert_eq!(score_threat(0, 0, 0, 0), 0.0);
    }

    struct QuietSystemEsi;

    #[async_trait]
    impl EsiQuery for QuietSystemEsi {
        async fn fetch_one(&self, request: &QueryRequest) -> ApiResult<Value> {
            match request.endpoint.as_str() {
                "/universe/system_kills/" => Ok(json!([
                    {"system_id": 30000142, "ship_kills": 10, "pod_kills": 5, "npc_kills": 40},
                    {"system_id": 30002187, "ship_kills": 1, "pod_kills": 0, "npc_kills": 3}
                ])),
                "/universe/system_jumps/" => Ok(json!([
                    {"system_id": 30000142, "ship_jumps": 300}
                ])),
                other => Err(ApiError::new(ApiErrorKind::NotFound, other)),
            }
        }

        async fn fetch_all(&self, request: &QueryRequest) -> ApiResult<Vec<Value>> {
            Ok(vec![self.fetch_one(request).await?])
        }
    }

    #[tokio::test]
    async fn assessment_combines_kills_jumps_and_pvp() {
        let jita = threat_assessment(&QuietSystemEsi, SolarSystemId(30000142), 10)
            .await
            .expect("assessment");
        assert_eq!(jita.score, 75.0);
        assert_eq!(jita.level, ThreatLevel::High);
        assert_eq!(jita.npc_kills, 40);

        let amarr = threat_assessment(&QuietSystemEsi, SolarSystemId(30002187), 0)
            .await
            .expect("assessment");
        assert_eq!(amarr.jumps, 0);
        assert_eq!(amarr.level, ThreatLevel::Low);
    }

    struct GarbledJumpsEsi;

    #[async_trait]
    impl EsiQuery for GarbledJumpsEsi {
        async fn fetch_one(&self, request: &QueryRequest) -> ApiResult<Value> {
            match request.endpoint.as_str() {
                "/universe/system_kills/" => Ok(json!([])),
                _ => Ok(Value::String("<html>maintenance</html>".to_string())),
            }
        }

        async fn fetch_all(&self, request: &QueryRequest) -> ApiResult<Vec<Value>> {
            Ok(vec![self.fetch_one(request).await?])
        }
    }

    #[tokio::test]
    async fn non_array_activity_body_is_an_error() {
        let err = threat_assessment(&GarbledJumpsEsi, SolarSystemId(30000142), 0)
            .await
            .expect_err("garbled jumps must not read as a quiet system");

        let EsiError::UnexpectedBody { endpoint, .. } = &err else {
            panic!("expected unexpected-body error, got {err:?}");
        };
        assert_eq!(endpoint, "/universe/system_jumps/");
    }
}
