//! Canonicalization of raw meter timestamps to UTC instants.
//!
//! Tokens with an explicit offset (`Z`, `+02:00`, `UTC`) convert directly.
//! Everything else is wall-clock time in the configured local zone and goes
//! through [`localize`], which is also used for billing period boundaries.
//!
//! `CET`/`CEST` are not treated as zones of their own. They are markers for
//! standard/summer time of the configured zone and only pick between the
//! zone's candidate offsets for a wall-clock value.

use std::fmt;

use chrono::{Offset, TimeZone};
use chrono_tz::{OffsetComponents, Tz};
use time::{
    macros::format_description, Date, OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

pub const DEFAULT_LOCAL_ZONE: Tz = chrono_tz::Europe::Prague;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("unparsable timestamp '{0}'")]
    Unparsable(String),
    #[error("local time {wall} does not exist in {zone}")]
    NonexistentLocalTime { wall: String, zone: String },
    #[error("local time {wall} is not {marker} in {zone}")]
    AbbreviationMismatch {
        wall: String,
        marker: ZoneMarker,
        zone: String,
    },
    #[error("unknown zone abbreviation '{0}'")]
    UnknownZoneAbbreviation(String),
}

/// Standard/summer marker carried by abbreviations such as `CET`/`CEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneMarker {
    Standard,
    Summer,
}

impl fmt::Display for ZoneMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard time"),
            Self::Summer => f.write_str("summer time"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneHint {
    Offset(UtcOffset),
    Marker(ZoneMarker),
}

fn hint_for_abbreviation(abbreviation: &str) -> Option<ZoneHint> {
    match abbreviation.to_ascii_uppercase().as_str() {
        "Z" | "UTC" | "GMT" => Some(ZoneHint::Offset(UtcOffset::UTC)),
        "CET" | "MEZ" => Some(ZoneHint::Marker(ZoneMarker::Standard)),
        "CEST" | "MESZ" => Some(ZoneHint::Marker(ZoneMarker::Summer)),
        _ => None,
    }
}

/// Normalize a raw timestamp token to a canonical UTC instant.
///
/// `None` and blank tokens yield `Ok(None)`. Wall-clock values are
/// interpreted in `zone`; an ambiguous fall-back hour resolves to its earliest
/// occurrence unless a `CET`/`CEST` marker says otherwise, and a skipped
/// spring-forward hour is an error.
pub fn normalize(raw: Option<&str>, zone: Tz) -> Result<Option<OffsetDateTime>, NormalizationError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let (body, hint) = split_zone_suffix(trimmed)?;
    let wall = parse_wall_clock(body).ok_or_else(|| NormalizationError::Unparsable(raw.to_string()))?;

    let instant = match hint {
        Some(ZoneHint::Offset(offset)) => wall.assume_offset(offset).to_offset(UtcOffset::UTC),
        Some(ZoneHint::Marker(marker)) => localize(zone, wall, Some(marker))?,
        None => localize(zone, wall, None)?,
    };

    Ok(Some(instant))
}

/// Interpret `wall` as local time in `zone` and return the UTC instant.
///
/// This is the single zone-resolution routine shared by reading ingestion and
/// billing period boundaries.
pub fn localize(
    zone: Tz,
    wall: PrimitiveDateTime,
    marker: Option<ZoneMarker>,
) -> Result<OffsetDateTime, NormalizationError> {
    let naive = to_naive(wall).ok_or_else(|| NormalizationError::Unparsable(wall.to_string()))?;

    let candidates = match zone.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => vec![dt],
        // chrono orders these as (earliest, latest)
        chrono::LocalResult::Ambiguous(earliest, latest) => vec![earliest, latest],
        chrono::LocalResult::None => {
            return Err(NormalizationError::NonexistentLocalTime {
                wall: wall.to_string(),
                zone: zone.name().to_string(),
            })
        }
    };

    let chosen = match marker {
        None => candidates[0],
        Some(marker) => candidates
            .into_iter()
            .find(|dt| {
                let summer = dt.offset().dst_offset().num_seconds() != 0;
                summer == (marker == ZoneMarker::Summer)
            })
            .ok_or_else(|| NormalizationError::AbbreviationMismatch {
                wall: wall.to_string(),
                marker,
                zone: zone.name().to_string(),
            })?,
    };

    let offset = UtcOffset::from_whole_seconds(chosen.offset().fix().local_minus_utc())
        .map_err(|_| NormalizationError::Unparsable(wall.to_string()))?;

    Ok(wall.assume_offset(offset).to_offset(UtcOffset::UTC))
}

/// UTC instant of local midnight starting `date` in `zone`.
pub fn local_midnight(zone: Tz, date: Date) -> Result<OffsetDateTime, NormalizationError> {
    localize(zone, date.midnight(), None)
}

/// Re-express a canonical instant in the offset `zone` observes at that instant.
pub fn to_local(zone: Tz, instant: OffsetDateTime) -> Result<OffsetDateTime, NormalizationError> {
    let utc = instant.to_offset(UtcOffset::UTC);
    let naive = to_naive(PrimitiveDateTime::new(utc.date(), utc.time()))
        .ok_or_else(|| NormalizationError::Unparsable(instant.to_string()))?;
    let offset = UtcOffset::from_whole_seconds(zone.offset_from_utc_datetime(&naive).fix().local_minus_utc())
        .map_err(|_| NormalizationError::Unparsable(instant.to_string()))?;

    Ok(utc.to_offset(offset))
}

fn to_naive(wall: PrimitiveDateTime) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDate::from_ymd_opt(wall.year(), u8::from(wall.month()) as u32, wall.day() as u32)?
        .and_hms_nano_opt(
            wall.hour() as u32,
            wall.minute() as u32,
            wall.second() as u32,
            wall.nanosecond(),
        )
}

/// Split a trailing zone designator off the token.
///
/// Recognizes `...Z`, a trailing alphabetic abbreviation separated by
/// whitespace, and numeric offsets either attached to the time or separated by
/// whitespace. A numeric offset is only looked for after the time part, so the
/// dashes of a bare date are never mistaken for one.
fn split_zone_suffix(token: &str) -> Result<(&str, Option<ZoneHint>), NormalizationError> {
    if let Some((body, last)) = token.rsplit_once(char::is_whitespace) {
        if last.chars().all(|c| c.is_ascii_alphabetic()) {
            let hint = hint_for_abbreviation(last)
                .ok_or_else(|| NormalizationError::UnknownZoneAbbreviation(last.to_string()))?;
            return Ok((body.trim_end(), Some(hint)));
        }
        if last.starts_with(['+', '-']) {
            if let Some(offset) = parse_offset(last) {
                return Ok((body.trim_end(), Some(ZoneHint::Offset(offset))));
            }
        }
    }

    if let Some(body) = token.strip_suffix(['Z', 'z']) {
        if body.ends_with(|c: char| c.is_ascii_digit()) {
            return Ok((body, Some(ZoneHint::Offset(UtcOffset::UTC))));
        }
    }

    if let Some(time_start) = token.find(':') {
        if let Some(idx) = token[time_start..].rfind(['+', '-']) {
            let idx = time_start + idx;
            if let Some(offset) = parse_offset(&token[idx..]) {
                return Ok((token[..idx].trim_end(), Some(ZoneHint::Offset(offset))));
            }
        }
    }

    Ok((token, None))
}

fn parse_offset(s: &str) -> Option<UtcOffset> {
    let layouts = [
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        format_description!("[offset_hour sign:mandatory][offset_minute]"),
        format_description!("[offset_hour sign:mandatory]"),
    ];

    layouts
        .into_iter()
        .find_map(|layout| UtcOffset::parse(s, layout).ok())
}

fn parse_wall_clock(body: &str) -> Option<PrimitiveDateTime> {
    let mut text = body.split_whitespace().collect::<Vec<_>>().join(" ");
    // ISO `T` separator between date and time
    if let Some(idx) = text.find(['T', 't']) {
        if text[..idx].ends_with(|c: char| c.is_ascii_digit()) {
            text.replace_range(idx..idx + 1, " ");
        }
    }

    // Day, month and hour accept one or two digits. Slashed dates are read
    // day-first unless they lead with the year.
    let datetime_layouts = [
        format_description!(
            "[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second].[subsecond]"
        ),
        format_description!("[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second]"),
        format_description!("[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]"),
        format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]:[second]"),
        format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]"),
        format_description!("[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]:[second]"),
        format_description!("[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]"),
        format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]:[second]"),
        format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]"),
    ];
    if let Some(dt) = datetime_layouts
        .into_iter()
        .find_map(|layout| PrimitiveDateTime::parse(&text, layout).ok())
    {
        return Some(dt);
    }

    let date_layouts = [
        format_description!("[year]-[month padding:none]-[day padding:none]"),
        format_description!("[year]/[month padding:none]/[day padding:none]"),
        format_description!("[day padding:none].[month padding:none].[year]"),
        format_description!("[day padding:none]/[month padding:none]/[year]"),
    ];
    date_layouts
        .into_iter()
        .find_map(|layout| Date::parse(&text, layout).ok())
        .map(Date::midnight)
}
