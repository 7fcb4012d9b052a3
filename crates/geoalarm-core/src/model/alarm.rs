// ── Alarm domain types ──
//
// The persisted alarm record and the validated value types it is built
// from. Field names serialize in camelCase to keep the stored layout
// `{id, name, timeOfDay, latitude, longitude, enabled, addressHint}`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ── AlarmId ─────────────────────────────────────────────────────────

/// Stable identifier of an alarm. Generated once at creation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(Uuid);

impl AlarmId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AlarmId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for AlarmId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CoreError::ValidationFailed {
                field: "id".into(),
                reason: format!("'{s}' is not an alarm id: {e}"),
            })
    }
}

impl From<Uuid> for AlarmId {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}

// ── TimeOfDay ───────────────────────────────────────────────────────

/// Hour and minute an alarm fires at. Carries no date: the scheduler
/// resolves it against the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, CoreError> {
        let tod = Self { hour, minute };
        tod.validate()?;
        Ok(tod)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.hour > 23 {
            return Err(CoreError::ValidationFailed {
                field: "timeOfDay.hour".into(),
                reason: format!("{} is outside 0-23", self.hour),
            });
        }
        if self.minute > 59 {
            return Err(CoreError::ValidationFailed {
                field: "timeOfDay.minute".into(),
                reason: format!("{} is outside 0-59", self.minute),
            });
        }
        Ok(())
    }

    /// Wall-clock time at second zero, or `None` for an out-of-range value.
    pub fn to_naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = CoreError;

    /// Parses `H:MM` / `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::ValidationFailed {
            field: "timeOfDay".into(),
            reason: format!("expected HH:MM, got '{s}'"),
        };
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if m.len() != 2 {
            return Err(invalid());
        }
        let hour = h.parse::<u8>().map_err(|_| invalid())?;
        let minute = m.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

// ── Coordinate ──────────────────────────────────────────────────────

/// A WGS-84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoreError> {
        let c = Self {
            latitude,
            longitude,
        };
        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoreError::ValidationFailed {
                field: "latitude".into(),
                reason: format!("{} is outside [-90, 90]", self.latitude),
            });
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoreError::ValidationFailed {
                field: "longitude".into(),
                reason: format!("{} is outside [-180, 180]", self.longitude),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinate {
    type Err = CoreError;

    /// Parses `LAT,LON`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::ValidationFailed {
            field: "coordinate".into(),
            reason: format!("expected LAT,LON, got '{s}'"),
        };
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        let latitude = lat.trim().parse::<f64>().map_err(|_| invalid())?;
        let longitude = lon.trim().parse::<f64>().map_err(|_| invalid())?;
        Self::new(latitude, longitude)
    }
}

// ── Alarm ───────────────────────────────────────────────────────────

/// A stored alarm definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: AlarmId,
    pub name: String,
    pub time_of_day: TimeOfDay,
    pub latitude: f64,
    pub longitude: f64,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_hint: Option<String>,
}

impl Alarm {
    /// Build a fresh, enabled alarm from validated user input.
    pub fn from_draft(draft: AlarmDraft) -> Result<Self, CoreError> {
        let draft = draft.normalized()?;
        Ok(Self {
            id: AlarmId::new(),
            name: draft.name,
            time_of_day: draft.time_of_day,
            latitude: draft.coordinate.latitude,
            longitude: draft.coordinate.longitude,
            enabled: true,
            address_hint: draft.address_hint,
        })
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Copy of this alarm with every editable field taken from `draft`.
    /// The identifier is preserved.
    pub fn with_draft(&self, draft: AlarmDraft) -> Result<Self, CoreError> {
        let draft = draft.normalized()?;
        Ok(Self {
            id: self.id,
            name: draft.name,
            time_of_day: draft.time_of_day,
            latitude: draft.coordinate.latitude,
            longitude: draft.coordinate.longitude,
            enabled: draft.enabled,
            address_hint: draft.address_hint,
        })
    }

    /// Check a record that came from outside (storage, import).
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                field: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        self.time_of_day.validate()?;
        self.coordinate().validate()
    }

    /// The editable fields as a draft, for partial edits.
    pub fn to_draft(&self) -> AlarmDraft {
        AlarmDraft {
            name: self.name.clone(),
            time_of_day: self.time_of_day,
            coordinate: self.coordinate(),
            enabled: self.enabled,
            address_hint: self.address_hint.clone(),
        }
    }
}

// ── AlarmDraft ──────────────────────────────────────────────────────

/// User-supplied fields for creating or editing an alarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDraft {
    pub name: String,
    pub time_of_day: TimeOfDay,
    pub coordinate: Coordinate,
    /// Ignored on creation: new alarms always start enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub address_hint: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl AlarmDraft {
    pub fn new(name: impl Into<String>, time_of_day: TimeOfDay, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            time_of_day,
            coordinate,
            enabled: true,
            address_hint: None,
        }
    }

    #[must_use]
    pub fn with_address_hint(mut self, hint: impl Into<String>) -> Self {
        self.address_hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Trim the name, drop a blank address hint, and range-check the rest.
    pub fn normalized(self) -> Result<Self, CoreError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(CoreError::ValidationFailed {
                field: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        self.time_of_day.validate()?;
        self.coordinate.validate()?;

        let address_hint = self
            .address_hint
            .map(|h| h.trim().to_owned())
            .filter(|h| !h.is_empty());

        Ok(Self {
            name,
            address_hint,
            ..self
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokyo() -> Coordinate {
        Coordinate::new(35.680_959_1, 139.767_306_8).unwrap()
    }

    #[test]
    fn time_of_day_parses_and_displays() {
        let t: TimeOfDay = "7:05".parse().unwrap();
        assert_eq!(t, TimeOfDay { hour: 7, minute: 5 });
        assert_eq!(t.to_string(), "07:05");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("12:5".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn coordinate_rejects_out_of_range() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn coordinate_parses_lat_lon_pair() {
        let c: Coordinate = "35.6809591, 139.7673068".parse().unwrap();
        assert!((c.latitude - 35.680_959_1).abs() < 1e-9);
        assert!("35.6".parse::<Coordinate>().is_err());
    }

    #[test]
    fn draft_normalization_trims_name_and_blank_hint() {
        let draft = AlarmDraft::new("  Go home  ", TimeOfDay::new(19, 0).unwrap(), tokyo())
            .with_address_hint("   ");
        let alarm = Alarm::from_draft(draft).unwrap();
        assert_eq!(alarm.name, "Go home");
        assert_eq!(alarm.address_hint, None);
        assert!(alarm.enabled);
    }

    #[test]
    fn blank_name_is_rejected() {
        let draft = AlarmDraft::new("   ", TimeOfDay::new(7, 0).unwrap(), tokyo());
        let err = Alarm::from_draft(draft).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { ref field, .. } if field == "name"));
    }

    #[test]
    fn with_draft_keeps_identity() {
        let alarm =
            Alarm::from_draft(AlarmDraft::new("a", TimeOfDay::new(7, 0).unwrap(), tokyo()))
                .unwrap();
        let edited = alarm
            .with_draft(alarm.to_draft().with_enabled(false))
            .unwrap();
        assert_eq!(edited.id, alarm.id);
        assert!(!edited.enabled);
    }

    #[test]
    fn serialized_layout_uses_camel_case_keys() {
        let alarm = Alarm::from_draft(
            AlarmDraft::new("Station", TimeOfDay::new(7, 0).unwrap(), tokyo())
                .with_address_hint("Tokyo Station"),
        )
        .unwrap();
        let json = serde_json::to_value(&alarm).unwrap();
        assert_eq!(json["timeOfDay"]["hour"], 7);
        assert_eq!(json["addressHint"], "Tokyo Station");
        assert_eq!(json["enabled"], true);
        assert!(json["id"].is_string());
    }

    #[test]
    fn alarm_id_round_trips_through_display() {
        let id = AlarmId::new();
        let parsed: AlarmId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<AlarmId>().is_err());
    }
}
