use anyhow::{ensure, Context};
use chrono::{DateTime, NaiveDateTime, Utc};
use seiscore::discovery::{RawChannel, RawStation};
use seiscore::records::EarthquakeEvent;
use seiscore::telemetry::LogManager;

const MIN_CHANNEL_COLUMNS: usize = 16;
const MIN_EVENT_COLUMNS: usize = 11;
/// Depth assumed when the catalog leaves it blank.
const DEFAULT_EVENT_DEPTH_KM: f64 = 10.0;

pub fn parse_fdsn_time(text: &str) -> anyhow::Result<DateTime<Utc>> {
    let trimmed = text.trim().trim_end_matches('Z');
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("parsing FDSN time '{}'", text))?;
    Ok(naive.and_utc())
}

fn parse_f64(field: &str, name: &str) -> anyhow::Result<f64> {
    field
        .trim()
        .parse::<f64>()
        .with_context(|| format!("bad {} '{}'", name, field))
}

/// Data rows of a `format=text` response with their 1-based line numbers.
fn data_rows(body: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(index, line)| (index + 1, line.split('|').collect()))
}

struct ChannelRow<'a> {
    network: &'a str,
    station: &'a str,
    latitude: f64,
    longitude: f64,
    elevation_m: f64,
    start: Option<DateTime<Utc>>,
    channel: RawChannel,
}

fn channel_row<'a>(fields: &[&'a str]) -> anyhow::Result<ChannelRow<'a>> {
    ensure!(
        fields.len() >= MIN_CHANNEL_COLUMNS,
        "expected {} columns, got {}",
        MIN_CHANNEL_COLUMNS,
        fields.len()
    );
    let start = match fields[15].trim() {
        "" => None,
        text => Some(parse_fdsn_time(text)?),
    };
    Ok(ChannelRow {
        network: fields[0].trim(),
        station: fields[1].trim(),
        latitude: parse_f64(fields[4], "latitude")?,
        longitude: parse_f64(fields[5], "longitude")?,
        elevation_m: parse_f64(fields[6], "elevation").unwrap_or(0.0),
        start,
        channel: RawChannel {
            code: fields[3].trim().to_string(),
            location: fields[2].trim().to_string(),
            sample_rate: fields[14].trim().parse::<f64>().ok(),
        },
    })
}

/// Parses the `format=text&level=channel` station response into one
/// [`RawStation`] per network/station, channels in response order.
///
/// Columns: Network | Station | Location | Channel | Latitude | Longitude |
/// Elevation | Depth | Azimuth | Dip | SensorDescription | Scale |
/// ScaleFreq | ScaleUnits | SampleRate | StartTime | EndTime
///
/// Rows that cannot be read are logged and skipped.
pub fn parse_channel_text(body: &str) -> Vec<RawStation> {
    let logger = LogManager::new("fdsn");
    let mut stations: Vec<RawStation> = Vec::new();
    for (number, fields) in data_rows(body) {
        let row = match channel_row(&fields) {
            Ok(row) => row,
            Err(err) => {
                logger.degraded(&format!("station response line {} skipped: {:#}", number, err));
                continue;
            }
        };
        match stations
            .iter_mut()
            .find(|s| s.network == row.network && s.station == row.station)
        {
            Some(existing) => {
                existing.start_date = match (existing.start_date, row.start) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                existing.channels.push(row.channel);
            }
            None => stations.push(RawStation {
                network: row.network.to_string(),
                station: row.station.to_string(),
                latitude: row.latitude,
                longitude: row.longitude,
                elevation_m: row.elevation_m,
                start_date: row.start,
                channels: vec![row.channel],
            }),
        }
    }
    stations
}

fn event_row(fields: &[&str]) -> anyhow::Result<EarthquakeEvent> {
    ensure!(
        fields.len() >= MIN_EVENT_COLUMNS,
        "expected {} columns, got {}",
        MIN_EVENT_COLUMNS,
        fields.len()
    );
    let id = fields[0].trim();
    ensure!(!id.is_empty(), "missing event id");
    let time = parse_fdsn_time(fields[1])?;
    let latitude = parse_f64(fields[2], "latitude")?;
    let longitude = parse_f64(fields[3], "longitude")?;
    let depth_km = match fields[4].trim() {
        "" => DEFAULT_EVENT_DEPTH_KM,
        text => parse_f64(text, "depth")?.max(0.0),
    };
    let magnitude = parse_f64(fields[10], "magnitude")?;
    let magnitude_type = match fields[9].trim() {
        "" => "M",
        text => text,
    };
    let location = match fields.get(12).map(|f| f.trim()) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => format!("Lat: {:.2}, Lon: {:.2}", latitude, longitude),
    };
    let event = EarthquakeEvent::new(id, time, latitude, longitude, depth_km, magnitude)?
        .with_description(magnitude_type, location);
    Ok(event)
}

/// Parses the `format=text` event response, newest origin first.
///
/// Columns: EventID | Time | Latitude | Longitude | Depth/km | Author |
/// Catalog | Contributor | ContributorID | MagType | Magnitude | MagAuthor |
/// EventLocationName
///
/// A blank depth is taken as 10 km and negative depths (above sea level)
/// as 0. Rows that cannot be read are logged and skipped.
pub fn parse_event_text(body: &str) -> Vec<EarthquakeEvent> {
    let logger = LogManager::new("fdsn");
    let mut events: Vec<EarthquakeEvent> = data_rows(body)
        .filter_map(|(number, fields)| match event_row(&fields) {
            Ok(event) => Some(event),
            Err(err) => {
                logger.degraded(&format!("event response line {} skipped: {:#}", number, err));
                None
            }
        })
        .collect();
    events.sort_by(|a, b| b.origin_time().cmp(&a.origin_time()));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\
#Network | Station | Location | Channel | Latitude | Longitude | Elevation | Depth | Azimuth | Dip | SensorDescription | Scale | ScaleFreq | ScaleUnits | SampleRate | StartTime | EndTime
IU|ANMO|00|BHZ|34.9459|-106.4572|1850.0|100.0|0.0|-90.0|Geotech KS-54000|3.4e9|0.02|M/S|20.0|2002-11-19T21:07:00|
IU|ANMO|00|HHZ|34.9459|-106.4572|1850.0|100.0|0.0|-90.0|Geotech KS-54000|3.4e9|0.02|M/S|100.0|1998-10-26T20:00:00.0000|2599-12-31T23:59:59
GE|WLF||BHZ|49.6646|6.1526|295.0|0.0|0.0|-90.0|STS-2|6e8|1.0|M/S|40|2006-01-01T00:00:00|
";

    const EVENTS: &str = "\
#EventID | Time | Latitude | Longitude | Depth/km | Author | Catalog | Contributor | ContributorID | MagType | Magnitude | MagAuthor | EventLocationName
11793085|2024-01-01T07:10:09.476|37.4874|137.2710|10.0|us|NEIC PDE|us|us6000m0xl|Mww|7.5|us|NEAR WEST COAST OF HONSHU, JAPAN
11800000|2024-04-02T23:58:11.000|23.8190|121.5620||us|NEIC PDE|us|us7000m9g4||7.4|us|
11700000|2023-12-02T14:37:04.000|8.5270|126.4160|-1.5|us|NEIC PDE|us|us7000lkay|mww|7.6|us|MINDANAO, PHILIPPINES
";

    #[test]
    fn channels_are_grouped_by_station() {
        let stations = parse_channel_text(BODY);
        assert_eq!(stations.len(), 2);
        let anmo = &stations[0];
        assert_eq!(anmo.channels.len(), 2);
        assert_eq!(anmo.channels[1].sample_rate, Some(100.0));
        assert_eq!(
            anmo.start_date.unwrap(),
            parse_fdsn_time("1998-10-26T20:00:00").unwrap()
        );
        assert_eq!(stations[1].channels[0].location, "");
    }

    #[test]
    fn unreadable_rows_are_skipped_and_the_rest_kept() {
        let body = "\
IU|ANMO|00|BHZ|34.9459|-106.4572|1850.0|100.0|0.0|-90.0|Geotech KS-54000|3.4e9|0.02|M/S|20.0|2002-11-19T21:07:00|
GE|WLF||BHZ|49.6646|6.1526|295.0|0.0|0.0|-90.0|STS-2|6e8|1.0|M/S|40|not-a-time|
II|PFO|00|BHZ|north|-116.4553|1280.0|5.3|0.0|-90.0|STS-1|1e9|0.05|M/S|20|2006-07-13T00:00:00|
IU|COLA|00
";
        let stations = parse_channel_text(body);
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].station, "ANMO");
        assert!(parse_channel_text("").is_empty());
    }

    #[test]
    fn events_are_sorted_newest_first_with_defaults_filled() {
        let events = parse_event_text(EVENTS);
        assert_eq!(events.len(), 3);
        let ids: Vec<_> = events.iter().map(|e| e.key().event_id).collect();
        assert_eq!(ids, ["11800000", "11793085", "11700000"]);

        let taiwan = &events[0];
        assert_eq!(taiwan.depth_km(), 10.0);
        assert_eq!(taiwan.magnitude_type(), "M");
        assert_eq!(taiwan.location(), "Lat: 23.82, Lon: 121.56");

        let noto = &events[1];
        assert_eq!(noto.magnitude(), 7.5);
        assert_eq!(noto.magnitude_type(), "Mww");
        assert_eq!(noto.location(), "NEAR WEST COAST OF HONSHU, JAPAN");
        assert_eq!(events[2].depth_km(), 0.0);
    }

    #[test]
    fn events_without_magnitude_or_position_are_skipped() {
        let body = "\
1|2024-01-01T00:00:00|10.0|20.0|30.0|us|C|us|x|Mw||us|no magnitude
2|2024-01-02T00:00:00|95.0|20.0|30.0|us|C|us|x|Mw|6.1|us|bad latitude
3|2024-01-03T00:00:00|10.0|20.0|30.0|us|C|us|x|Mw|6.2|us|kept
";
        let events = parse_event_text(body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location(), "kept");
    }
}
