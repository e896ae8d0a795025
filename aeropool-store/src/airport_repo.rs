use aeropool_core::geo::{bounding_box, haversine_m, GeoPoint};
use aeropool_domain::airport::{Airport, AirportSize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{StoreError, StoreResult};

pub struct AirportRepo {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct AirportRow {
    id: Uuid,
    iata_code: String,
    icao_code: Option<String>,
    name: String,
    city: String,
    country: String,
    country_code: String,
    lon: f64,
    lat: f64,
    size_class: String,
    aliases: serde_json::Value,
    is_active: bool,
}

const AIRPORT_COLUMNS: &str =
    "id, iata_code, icao_code, name, city, country, country_code, lon, lat, size_class, aliases, is_active";

fn map_airport(row: AirportRow) -> StoreResult<Airport> {
    let size = AirportSize::parse(&row.size_class)
        .ok_or_else(|| StoreError::Decode(format!("unknown airport size {}", row.size_class)))?;
    let aliases: Vec<String> = serde_json::from_value(row.aliases)
        .map_err(|e| StoreError::Decode(format!("aliases: {e}")))?;
    Ok(Airport {
        id: row.id,
        iata_code: row.iata_code,
        icao_code: row.icao_code,
        name: row.name,
        city: row.city,
        country: row.country,
        country_code: row.country_code,
        location: GeoPoint::new(row.lon, row.lat),
        size,
        aliases,
        is_active: row.is_active,
    })
}

impl AirportRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Airport>> {
        let sql = format!("SELECT {AIRPORT_COLUMNS} FROM airports WHERE id = $1");
        let row: Option<AirportRow> =
            sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(map_airport).transpose()
    }

    /// Combined text / country / proximity search over the catalog.
    ///
    /// Text matching covers codes, name, city and aliases. With a center
    /// point the candidates are prefiltered by bounding box and ordered by
    /// exact great-circle distance.
    pub async fn search(
        &self,
        query: Option<&str>,
        country_code: Option<&str>,
        near: Option<(GeoPoint, f64)>,
        limit: i64,
    ) -> StoreResult<Vec<Airport>> {
        let q = query.unwrap_or("").trim();
        let country = country_code.unwrap_or("");
        // Index-friendly prefilter rectangle; exact distance is applied in
        // Rust below. A degenerate box passes everything.
        let b = match near {
            Some((center, radius_m)) => bounding_box(center, radius_m),
            None => bounding_box(GeoPoint::new(0.0, 0.0), 0.0),
        };
        let use_box = near.is_some();

        let sql = format!(
            "SELECT {AIRPORT_COLUMNS} FROM airports \
             WHERE is_active = TRUE \
               AND ($1 = '' OR iata_code ILIKE $1 OR icao_code ILIKE $1 \
                    OR name ILIKE $2 OR city ILIKE $2 OR aliases::TEXT ILIKE $2) \
               AND ($3 = '' OR country_code = $3) \
               AND (NOT $4 OR (lat BETWEEN $5 AND $6 AND lon BETWEEN $7 AND $8)) \
             ORDER BY name LIMIT $9"
        );

        let rows: Vec<AirportRow> = sqlx::query_as(&sql)
            .bind(q.to_string())
            .bind(format!("%{q}%"))
            .bind(country.to_string())
            .bind(use_box)
            .bind(b.min_lat)
            .bind(b.max_lat)
            .bind(b.min_lon)
            .bind(b.max_lon)
            .bind(limit.clamp(1, 100))
            .fetch_all(&self.pool)
            .await?;

        let mut airports = rows
            .into_iter()
            .map(map_airport)
            .collect::<StoreResult<Vec<_>>>()?;

        if let Some((center, radius_m)) = near {
            airports.retain(|a| haversine_m(center, a.location) <= radius_m);
            airports.sort_by(|a, b| {
                haversine_m(center, a.location).total_cmp(&haversine_m(center, b.location))
            });
        }
        Ok(airports)
    }
}
