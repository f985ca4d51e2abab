//! Input validation for zone definitions, config values and shop entries

use crate::contract::{CaptureZonesError, Geometry, ShopItem, ZoneType};
use jsonschema::Validator;
use serde_json::Value;

/// Validate zone id format
///
/// Accepts ids that start with an alphanumeric character and contain only
/// alphanumeric characters, '_', '-' and '.'. Ids are used as storage key
/// segments, so '/' and whitespace are rejected.
/// Words the admin command grammar uses in place of a zone id
pub const RESERVED_ZONE_IDS: [&str; 2] = ["all", "global"];

pub fn validate_zone_id(zone_id: &str) -> Result<(), CaptureZonesError> {
    let Some(first_char) = zone_id.chars().next() else {
        return Err(CaptureZonesError::invalid_argument("zone id cannot be empty"));
    };

    if RESERVED_ZONE_IDS.iter().any(|word| zone_id.eq_ignore_ascii_case(word)) {
        return Err(CaptureZonesError::invalid_argument(format!(
            "zone id '{}' is reserved by admin commands",
            zone_id
        )));
    }

    if !first_char.is_alphanumeric() {
        return Err(CaptureZonesError::invalid_argument(format!(
            "zone id '{}' must start with alphanumeric character",
            zone_id
        )));
    }

    let is_valid = zone_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');

    if !is_valid {
        return Err(CaptureZonesError::invalid_argument(format!(
            "zone id '{}' contains invalid characters. Only alphanumeric, '_', '-', and '.' are allowed",
            zone_id
        )));
    }

    Ok(())
}

/// Reject degenerate geometry: radius <= 0, or min >= max on any axis
pub fn validate_geometry(geometry: &Geometry) -> Result<(), CaptureZonesError> {
    match geometry {
        Geometry::Point {
            center,
            radius_chunks,
        } => {
            if *radius_chunks <= 0 {
                return Err(CaptureZonesError::InvalidGeometry {
                    message: format!("radius must be positive, got {}", radius_chunks),
                });
            }
            if !(center.x.is_finite() && center.y.is_finite() && center.z.is_finite()) {
                return Err(CaptureZonesError::InvalidGeometry {
                    message: "center coordinates must be finite".to_string(),
                });
            }
        }
        Geometry::Cuboid { min, max } => {
            for (axis, lo, hi) in [("x", min.x, max.x), ("y", min.y, max.y), ("z", min.z, max.z)] {
                // NaN fails the comparison and is rejected too
                if !(lo < hi) {
                    return Err(CaptureZonesError::InvalidGeometry {
                        message: format!("min {} must be below max {} on the {} axis", lo, hi, axis),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Validate player count bounds: `0 <= min_players <= max_players`
pub fn validate_player_limits(min_players: i32, max_players: i32) -> Result<(u32, u32), CaptureZonesError> {
    if min_players < 0 {
        return Err(CaptureZonesError::invalid_argument(format!(
            "minPlayers must be >= 0, got {}",
            min_players
        )));
    }
    if max_players < min_players {
        return Err(CaptureZonesError::invalid_argument(format!(
            "maxPlayers must be >= minPlayers ({}), got {}",
            min_players, max_players
        )));
    }
    Ok((min_players as u32, max_players as u32))
}

pub fn parse_zone_type(zone_type: &str) -> Result<ZoneType, CaptureZonesError> {
    zone_type
        .parse::<ZoneType>()
        .map_err(CaptureZonesError::invalid_argument)
}

/// Parse a `ITEM:price` shop catalog entry
pub fn parse_shop_item(entry: &str) -> Result<ShopItem, CaptureZonesError> {
    let (item, price) = entry.split_once(':').ok_or_else(|| {
        CaptureZonesError::invalid_argument(format!("shop entry '{}' must be ITEM:price", entry))
    })?;
    let item = item.trim();
    if item.is_empty() {
        return Err(CaptureZonesError::invalid_argument(format!(
            "shop entry '{}' has an empty item",
            entry
        )));
    }
    let price: f64 = price.trim().parse().map_err(|_| {
        CaptureZonesError::invalid_argument(format!("shop entry '{}' has a non-numeric price", entry))
    })?;
    if !price.is_finite() || price < 0.0 {
        return Err(CaptureZonesError::invalid_argument(format!(
            "shop entry '{}' has a negative price",
            entry
        )));
    }
    Ok(ShopItem {
        item: item.to_string(),
        price,
    })
}

/// Compile a schema fragment for a config path
pub fn compile_schema(path: &str, schema: &Value) -> Result<Validator, CaptureZonesError> {
    Validator::new(schema).map_err(|e| CaptureZonesError::SchemaMismatch {
        path: path.to_string(),
        details: format!("invalid JSON Schema: {}", e),
    })
}

/// Validate a config value against the compiled schema of its path
pub fn validate_against_schema(
    path: &str,
    data: &Value,
    validator: &Validator,
) -> Result<(), CaptureZonesError> {
    if let Err(error) = validator.validate(data) {
        return Err(CaptureZonesError::SchemaMismatch {
            path: path.to_string(),
            details: error.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Position;
    use serde_json::json;

    #[test]
    fn test_validate_zone_id() {
        assert!(validate_zone_id("A1").is_ok());
        assert!(validate_zone_id("north_gate-2").is_ok());
        assert!(validate_zone_id("hill.v2").is_ok());

        assert!(validate_zone_id("").is_err());
        assert!(validate_zone_id("_hidden").is_err());
        assert!(validate_zone_id("a/b").is_err());
        assert!(validate_zone_id("a b").is_err());
        assert!(validate_zone_id("all").is_err());
        assert!(validate_zone_id("Global").is_err());
        assert!(validate_zone_id("allies").is_ok());
    }

    #[test]
    fn test_point_geometry_radius() {
        let center = Position::new(0.0, 64.0, 0.0);
        assert!(validate_geometry(&Geometry::Point { center, radius_chunks: 2 }).is_ok());

        let result = validate_geometry(&Geometry::Point { center, radius_chunks: 0 });
        assert!(matches!(result, Err(CaptureZonesError::InvalidGeometry { .. })));
        assert!(validate_geometry(&Geometry::Point { center, radius_chunks: -3 }).is_err());
    }

    #[test]
    fn test_cuboid_geometry_bounds() {
        let min = Position::new(0.0, 0.0, 0.0);
        assert!(validate_geometry(&Geometry::Cuboid {
            min,
            max: Position::new(10.0, 10.0, 10.0)
        })
        .is_ok());

        // flat on y
        let result = validate_geometry(&Geometry::Cuboid {
            min,
            max: Position::new(10.0, 0.0, 10.0),
        });
        assert!(matches!(result, Err(CaptureZonesError::InvalidGeometry { .. })));

        // inverted on z
        assert!(validate_geometry(&Geometry::Cuboid {
            min,
            max: Position::new(10.0, 10.0, -1.0)
        })
        .is_err());
    }

    #[test]
    fn test_player_limits() {
        assert_eq!(validate_player_limits(1, 4).unwrap(), (1, 4));
        assert_eq!(validate_player_limits(0, 0).unwrap(), (0, 0));
        assert_eq!(validate_player_limits(3, 3).unwrap(), (3, 3));

        assert!(validate_player_limits(-1, 4).is_err());
        assert!(validate_player_limits(5, 4).is_err());
        assert!(validate_player_limits(3, 0).is_err());
        assert!(validate_player_limits(0, -2).is_err());
    }

    #[test]
    fn test_parse_zone_type() {
        assert_eq!(parse_zone_type("koth").unwrap(), ZoneType::KothEligible);
        assert_eq!(parse_zone_type("CAPTURE_POINT").unwrap(), ZoneType::CapturePoint);
        assert!(matches!(
            parse_zone_type("arena"),
            Err(CaptureZonesError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_parse_shop_item() {
        let item = parse_shop_item("DIAMOND:12.5").unwrap();
        assert_eq!(item.item, "DIAMOND");
        assert_eq!(item.price, 12.5);

        assert!(parse_shop_item("DIAMOND").is_err());
        assert!(parse_shop_item(":5").is_err());
        assert!(parse_shop_item("DIAMOND:lots").is_err());
        assert!(parse_shop_item("DIAMOND:-1").is_err());
    }

    #[test]
    fn test_schema_type_mismatch() {
        let validator = compile_schema("capture.time-seconds", &json!({"type": "number", "exclusiveMinimum": 0})).unwrap();

        assert!(validate_against_schema("capture.time-seconds", &json!(30), &validator).is_ok());

        let result = validate_against_schema("capture.time-seconds", &json!("thirty"), &validator);
        assert!(matches!(result, Err(CaptureZonesError::SchemaMismatch { .. })));

        assert!(validate_against_schema("capture.time-seconds", &json!(0), &validator).is_err());
    }
}
