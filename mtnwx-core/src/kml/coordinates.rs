use tracing::warn;

/// `[longitude, latitude]`, the GeoJSON position order.
pub type Position = [f64; 2];

/// Parse a KML `<coordinates>` string (`lon,lat[,alt] lon,lat[,alt] ...`).
///
/// Altitude is ignored. Tokens that do not yield two finite numbers are
/// skipped with a warning; the rest of the list is kept. Ring closure and
/// vertex count are not checked.
pub fn parse_coordinates(raw: &str) -> Vec<Position> {
    raw.split_whitespace()
        .filter_map(|token| {
            let position = parse_token(token);
            if position.is_none() {
                warn!(token, "skipping malformed coordinate");
            }
            position
        })
        .collect()
}

fn parse_token(token: &str) -> Option<Position> {
    let mut parts = token.split(',');
    let lon = parts.next()?.trim().parse::<f64>().ok()?;
    let lat = parts.next()?.trim().parse::<f64>().ok()?;

    (lon.is_finite() && lat.is_finite()).then_some([lon, lat])
}
