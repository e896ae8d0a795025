use aeropool_core::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AirportSize {
    Large,
    Medium,
    Small,
}

impl AirportSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirportSize::Large => "large",
            AirportSize::Medium => "medium",
            AirportSize::Small => "small",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "large" => Some(AirportSize::Large),
            "medium" => Some(AirportSize::Medium),
            "small" => Some(AirportSize::Small),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Airport {
    pub id: Uuid,
    pub iata_code: String,
    pub icao_code: Option<String>,
    pub name: String,
    pub city: String,
    pub country: String,
    pub country_code: String,
    pub location: GeoPoint,
    pub size: AirportSize,
    pub aliases: Vec<String>,
    pub is_active: bool,
}

impl Airport {
    /// Case-insensitive match against code, name, city or aliases.
    pub fn matches_query(&self, q: &str) -> bool {
        let q = q.to_lowercase();
        self.iata_code.to_lowercase() == q
            || self
                .icao_code
                .as_deref()
                .is_some_and(|c| c.to_lowercase() == q)
            || self.name.to_lowercase().contains(&q)
            || self.city.to_lowercase().contains(&q)
            || self.aliases.iter().any(|a| a.to_lowercase().contains(&q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_code_and_alias() {
        let airport = Airport {
            id: Uuid::new_v4(),
            iata_code: "AMS".into(),
            icao_code: Some("EHAM".into()),
            name: "Amsterdam Airport Schiphol".into(),
            city: "Amsterdam".into(),
            country: "Netherlands".into(),
            country_code: "NL".into(),
            location: GeoPoint::new(4.7683, 52.3105),
            size: AirportSize::Large,
            aliases: vec!["Schiphol".into()],
            is_active: true,
        };
        assert!(airport.matches_query("ams"));
        assert!(airport.matches_query("schiphol"));
        assert!(airport.matches_query("Amster"));
        assert!(!airport.matches_query("CDG"));
    }
}
