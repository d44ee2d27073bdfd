//! Fixed-header scan of SEED 2.4 data records, the format
//! fdsnws-dataselect/1 returns. Sample payloads are skipped.

use anyhow::{bail, Context};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use seiscore::discovery::RawTrace;

const FIXED_HEADER_LEN: usize = 48;
const DEFAULT_RECORD_LEN: usize = 4096;
const BLOCKETTE_1000: u16 = 1000;

#[derive(Debug, Clone, Copy)]
enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    fn u16(self, bytes: &[u8]) -> u16 {
        let pair = [bytes[0], bytes[1]];
        match self {
            ByteOrder::Big => u16::from_be_bytes(pair),
            ByteOrder::Little => u16::from_le_bytes(pair),
        }
    }

    fn i16(self, bytes: &[u8]) -> i16 {
        self.u16(bytes) as i16
    }
}

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Sample rate from the header factor/multiplier pair.
fn sample_rate(factor: i16, multiplier: i16) -> f64 {
    let (f, m) = (factor as f64, multiplier as f64);
    match (factor, multiplier) {
        (0, _) | (_, 0) => 0.0,
        (f_, m_) if f_ > 0 && m_ > 0 => f * m,
        (f_, _) if f_ > 0 => -f / m,
        (_, m_) if m_ > 0 => -m / f,
        _ => 1.0 / (f * m),
    }
}

struct Header {
    network: String,
    station: String,
    location: String,
    channel: String,
    start: chrono::DateTime<Utc>,
    sample_count: usize,
    sampling_rate: f64,
    record_len: usize,
}

fn parse_header(record: &[u8]) -> anyhow::Result<Header> {
    if record.len() < FIXED_HEADER_LEN {
        bail!("record shorter than the fixed header");
    }
    let year_be = u16::from_be_bytes([record[20], record[21]]);
    let order = if (1900..=2100).contains(&year_be) {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
    let year = order.u16(&record[20..22]) as i32;
    let day = order.u16(&record[22..24]) as u32;
    let (hour, minute, second) = (record[24] as u32, record[25] as u32, record[26] as u32);
    let tenth_ms = order.u16(&record[28..30]) as i64;
    let date = NaiveDate::from_yo_opt(year, day)
        .with_context(|| format!("invalid record date {}-{}", year, day))?;
    let time = date
        .and_hms_opt(hour, minute, second.min(59))
        .with_context(|| format!("invalid record time {}:{}:{}", hour, minute, second))?;
    let start = Utc.from_utc_datetime(&time) + Duration::microseconds(tenth_ms * 100);

    let mut record_len = DEFAULT_RECORD_LEN;
    let mut offset = order.u16(&record[46..48]) as usize;
    while offset != 0 && offset + 8 <= record.len() {
        let kind = order.u16(&record[offset..offset + 2]);
        if kind == BLOCKETTE_1000 {
            record_len = 1usize << record[offset + 6].clamp(8, 20);
            break;
        }
        let next = order.u16(&record[offset + 2..offset + 4]) as usize;
        if next <= offset {
            break;
        }
        offset = next;
    }

    Ok(Header {
        station: ascii(&record[8..13]),
        location: ascii(&record[13..15]),
        channel: ascii(&record[15..18]),
        network: ascii(&record[18..20]),
        start,
        sample_count: order.u16(&record[30..32]) as usize,
        sampling_rate: sample_rate(order.i16(&record[32..34]), order.i16(&record[34..36])),
        record_len,
    })
}

/// One [`RawTrace`] per N.S.L.C found in `bytes`, with summed sample counts
/// and the earliest record start.
pub fn scan_records(bytes: &[u8]) -> anyhow::Result<Vec<RawTrace>> {
    let mut traces: Vec<RawTrace> = Vec::new();
    let mut position = 0;
    while position + FIXED_HEADER_LEN <= bytes.len() {
        let header = parse_header(&bytes[position..])
            .with_context(|| format!("record at byte {}", position))?;
        match traces.iter_mut().find(|t| {
            t.network == header.network
                && t.station == header.station
                && t.location == header.location
                && t.channel == header.channel
        }) {
            Some(trace) => {
                trace.sample_count += header.sample_count;
                trace.start = trace.start.min(header.start);
            }
            None => traces.push(RawTrace {
                network: header.network,
                station: header.station,
                location: header.location,
                channel: header.channel,
                start: header.start,
                sampling_rate: header.sampling_rate,
                sample_count: header.sample_count,
                samples: Vec::new(),
            }),
        }
        position += header.record_len;
    }
    Ok(traces)
}
