use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use capsuleer_core::{CharacterId, PlanetId, SolarSystemId, Timestamp, TypeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    EsiResult,
    errors::ApiErrorKind,
    query::{EsiQuery, QueryRequest},
};

const SECS_PER_HOUR: f64 = 3600.0;

/// When a colony is reported as needing attention.
#[derive(Clone, Debug, PartialEq)]
pub struct PiThresholds {
    pub extractor_warning: Duration,
    pub storage_fill_pct: f64,
}

impl Default for PiThresholds {
    fn default() -> Self {
        Self {
            extractor_warning: Duration::from_secs(6 * 60 * 60),
            storage_fill_pct: 80.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PlanetSummary {
    pub planet_id: PlanetId,
    #[serde(default)]
    pub planet_type: Option<String>,
    #[serde(default)]
    pub solar_system_id: Option<SolarSystemId>,
    #[serde(default)]
    pub upgrade_level: Option<u8>,
    #[serde(default)]
    pub num_pins: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ColonyLayout {
    #[serde(default)]
    pub pins: Vec<Pin>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Pin {
    pub pin_id: i64,
    #[serde(default)]
    pub type_id: Option<TypeId>,
    #[serde(default)]
    pub expiry_time: Option<String>,
    #[serde(default)]
    pub extractor_details: Option<ExtractorDetails>,
    #[serde(default)]
    pub factory_details: Option<Value>,
    #[serde(default)]
    pub schematic_id: Option<i32>,
    #[serde(default)]
    pub contents: Vec<PinContent>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ExtractorDetails {
    #[serde(default)]
    pub product_type_id: Option<TypeId>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PinContent {
    pub type_id: TypeId,
    pub amount: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Route {
    pub source_pin_id: i64,
    pub destination_pin_id: i64,
    pub content_type_id: TypeId,
}

/// Colony layout plus the public planet name, when ESI knew it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlanetDetail {
    pub name: Option<String>,
    pub layout: ColonyLayout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorState {
    Idle,
    Running,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtractorStatus {
    pub product: String,
    pub product_type_id: Option<TypeId>,
    pub expiry: Option<String>,
    pub hours_remaining: Option<f64>,
    pub status: ExtractorState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FactoryStatus {
    pub input: String,
    pub output: String,
    pub schematic: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanetStatus {
    pub planet_id: PlanetId,
    pub planet_name: String,
    pub planet_type: Option<String>,
    pub solar_system_id: Option<SolarSystemId>,
    pub extractors: Vec<ExtractorStatus>,
    pub storage_fill_pct: Option<f64>,
    pub factories: Vec<FactoryStatus>,
    pub needs_attention: bool,
    pub action_required: String,
}

pub async fn pi_planets<Q>(esi: &Q, character_id: CharacterId, token: &str) -> EsiResult<Vec<Value>>
where
    Q: EsiQuery + ?Sized,
{
    let request = QueryRequest::get(format!("/characters/{character_id}/planets/"))
        .with_token(token)
        .paginated();
    Ok(esi.fetch_all(&request).await?)
}

pub async fn pi_planet_detail<Q>(
    esi: &Q,
    character_id: CharacterId,
    planet_id: PlanetId,
    token: &str,
) -> EsiResult<Value>
where
    Q: EsiQuery + ?Sized,
{
    let request = QueryRequest::get(format!("/characters/{character_id}/planets/{planet_id}/"))
        .with_token(token);
    Ok(esi.fetch_one(&request).await?)
}

pub async fn pi_status<Q>(
    esi: &Q,
    character_id: CharacterId,
    token: &str,
    thresholds: &PiThresholds,
) -> EsiResult<Vec<PlanetStatus>>
where
    Q: EsiQuery + ?Sized,
{
    let planets: Vec<PlanetSummary> = pi_planets(esi, character_id, token)
        .await?
        .into_iter()
        .filter_map(|raw| match serde_json::from_value(raw) {
            Ok(planet) => Some(planet),
            Err(err) => {
                log::debug!("skipping unreadable planet entry: {err}");
                None
            }
        })
        .collect();

    let mut details = HashMap::with_capacity(planets.len());
    for planet in &planets {
        let raw = pi_planet_detail(esi, character_id, planet.planet_id, token).await?;
        let layout = if raw.is_object() {
            serde_json::from_value(raw)?
        } else {
            ColonyLayout::default()
        };
        let name = public_planet_name(esi, planet.planet_id).await?;
        details.insert(planet.planet_id, PlanetDetail { name, layout });
    }

    Ok(parse_pi_status(&planets, &details, Timestamp::now(), thresholds))
}

async fn public_planet_name<Q>(esi: &Q, planet_id: PlanetId) -> EsiResult<Option<String>>
where
    Q: EsiQuery + ?Sized,
{
    match esi
        .fetch_one(&QueryRequest::get(format!("/universe/planets/{planet_id}/")))
        .await
    {
        Ok(body) => Ok(body
            .get("name")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)),
        Err(err) if err.kind == ApiErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Reduces raw colony data to per-planet status, flagging extractors and storage per `thresholds`.
pub fn parse_pi_status(
    planets: &[PlanetSummary],
    details: &HashMap<PlanetId, PlanetDetail>,
    now: Timestamp,
    thresholds: &PiThresholds,
) -> Vec<PlanetStatus> {
    let empty = PlanetDetail::default();

    planets
        .iter()
        .map(|planet| {
            let detail = details.get(&planet.planet_id).unwrap_or(&empty);
            let mut reasons = Vec::new();

            let extractors: Vec<ExtractorStatus> = detail
                .layout
                .pins
                .iter()
                .filter_map(|pin| {
                    let extractor = pin.extractor_details.as_ref()?;
                    Some(extractor_status(pin, extractor, now, thresholds, &mut reasons))
                })
                .collect();

            let factories = factory_statuses(&detail.layout);

            let storage_fill_pct = estimate_storage_fill_pct(&detail.layout.pins);
            if let Some(fill) = storage_fill_pct
                && fill > thresholds.storage_fill_pct
            {
                reasons.push(format!("Storage/Launchpad at {fill}%"));
            }

            let mut seen = BTreeSet::new();
            reasons.retain(|reason| seen.insert(reason.clone()));

            PlanetStatus {
                planet_id: planet.planet_id,
                planet_name: detail
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Planet {}", planet.planet_id)),
                planet_type: planet.planet_type.clone(),
                solar_system_id: planet.solar_system_id,
                extractors,
                storage_fill_pct,
                factories,
                needs_attention: !reasons.is_empty(),
                action_required: if reasons.is_empty() {
                    "none".to_string()
                } else {
                    reasons.join("; ")
                },
            }
        })
        .collect()
}

fn extractor_status(
    pin: &Pin,
    extractor: &ExtractorDetails,
    now: Timestamp,
    thresholds: &PiThresholds,
    reasons: &mut Vec<String>,
) -> ExtractorStatus {
    let expiry = pin.expiry_time.as_deref().and_then(Timestamp::parse_rfc3339);
    let remaining_secs = expiry.map(|expiry| expiry.signed_duration_since(now).num_seconds());
    let hours_remaining = remaining_secs.map(|secs| round_cents(secs as f64 / SECS_PER_HOUR));

    let status = match remaining_secs {
        None => ExtractorState::Idle,
        Some(secs) if secs > 0 => ExtractorState::Running,
        Some(_) => ExtractorState::Expired,
    };

    match (status, remaining_secs, hours_remaining) {
        (ExtractorState::Expired, _, _) => reasons.push("Extractor already expired".to_string()),
        (ExtractorState::Running, Some(secs), Some(hours))
            if (secs as u64) < thresholds.extractor_warning.as_secs() =>
        {
            reasons.push(format!("Extractor expires in {hours}h"));
        }
        _ => {}
    }

    ExtractorStatus {
        product: product_name(extractor.product_type_id),
        product_type_id: extractor.product_type_id,
        expiry: pin.expiry_time.clone(),
        hours_remaining,
        status,
    }
}

fn factory_statuses(layout: &ColonyLayout) -> Vec<FactoryStatus> {
    let mut incoming: HashMap<i64, BTreeSet<TypeId>> = HashMap::new();
    let mut outgoing: HashMap<i64, BTreeSet<TypeId>> = HashMap::new();
    for route in &layout.routes {
        outgoing
            .entry(route.source_pin_id)
            .or_default()
            .insert(route.content_type_id);
        incoming
            .entry(route.destination_pin_id)
            .or_default()
            .insert(route.content_type_id);
    }

    let describe = |types: Option<&BTreeSet<TypeId>>| match types {
        Some(types) if !types.is_empty() => types
            .iter()
            .map(|type_id| product_name(Some(*type_id)))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "unknown".to_string(),
    };

    layout
        .pins
        .iter()
        .filter(|pin| pin.factory_details.is_some() || pin.schematic_id.is_some())
        .map(|pin| FactoryStatus {
            input: describe(incoming.get(&pin.pin_id)),
            output: describe(outgoing.get(&pin.pin_id)),
            schematic: pin
                .schematic_id
                .map(|id| format!("Schematic {id}"))
                .unwrap_or_else(|| "unknown".to_string()),
        })
        .collect()
}

/// Highest fill percentage across pins whose capacity is known.
pub fn estimate_storage_fill_pct(pins: &[Pin]) -> Option<f64> {
    pins.iter()
        .filter_map(|pin| {
            let capacity = storage_capacity(pin.type_id?)?;
            let total: f64 = pin.contents.iter().map(|content| content.amount).sum();
            Some(round_cents(total / capacity * 100.0).min(100.0))
        })
        .reduce(f64::max)
}

fn storage_capacity(type_id: TypeId) -> Option<f64> {
    match type_id.0 {
        2524 | 2544 => Some(10_000.0),
        2256 => Some(12_000.0),
        _ => None,
    }
}

pub fn product_name(type_id: Option<TypeId>) -> String {
    let Some(type_id) = type_id else {
        return "unknown".to_string();
    };

    let name = match type_id.0 {
        // P0
        2393 => "Aqueous Liquids",
        2396 => "Base Metals",
        2397 => "Carbon Compounds",
        2398 => "Complex Organisms",
        2401 => "Heavy Metals",
        // P1
        2389 => "Bacteria",
        2390 => "Biofuels",
        2399 => "Industrial Fibers",
        3779 => "Biomass",
        2400 => "Precious Metals",
        2317 => "Water",
        9828 => "Silicon",
        // P2 and up
        44 => "Enriched Uranium",
        3689 => "Mechanical Parts",
        9836 => "Consumer Electronics",
        9832 => "Construction Blocks",
        3683 => "Coolant",
        2867 => "Broadcast Node",
        2868 => "Camera Drones",
        2869 => "Synthetic Synapses",
        2870 => "Gel-Matrix Biopaste",
        2871 => "Hazmat Detection Systems",
        2872 => "Integrity Response Drones",
        2873 => "Organic Mortar Applicators",
        2874 => "Nano-Factory",
        2875 => "Sterile Conduits",
        _ => return format!("type_id:{type_id}"),
    };
    name.to_string()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
