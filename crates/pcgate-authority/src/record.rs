//! Raw session records and their normalization

use pcgate_api::{Expiry, StatusSnapshot};
use pcgate_host_api::{AuthorityError, AuthorityResult};
use serde::Deserialize;

/// Value of `estado` that marks a workstation as in use
pub const OCCUPIED_STATE: &str = "ocupada";

/// One row of the status table as the authority returns it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub tiempo_limite: Option<String>,
}

impl StatusRecord {
    pub fn is_occupied(&self) -> bool {
        self.estado.as_deref().map(str::trim) == Some(OCCUPIED_STATE)
    }

    pub fn into_snapshot(self) -> StatusSnapshot {
        if !self.is_occupied() {
            return StatusSnapshot::available();
        }
        StatusSnapshot::occupied(Expiry::parse(self.tiempo_limite.as_deref()))
    }
}

/// Decode a response body holding zero or more records
pub fn decode_records(body: &str) -> AuthorityResult<Vec<StatusRecord>> {
    serde_json::from_str(body).map_err(|e| AuthorityError::Decode(e.to_string()))
}

/// Reduce a query result to a snapshot. Only the first record counts.
pub fn snapshot_from_records(records: Vec<StatusRecord>) -> StatusSnapshot {
    match records.into_iter().next() {
        Some(record) => record.into_snapshot(),
        None => StatusSnapshot::not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn snapshot(body: &str) -> StatusSnapshot {
        snapshot_from_records(decode_records(body).unwrap())
    }

    #[test]
    fn empty_array_is_not_found() {
        assert_eq!(snapshot("[]"), StatusSnapshot::not_found());
    }

    #[test]
    fn occupied_with_deadline() {
        let snap = snapshot(
            r#"[{"id": 7, "estado": "ocupada", "tiempo_limite": "2025-01-01T00:10:00+00:00"}]"#,
        );
        assert!(snap.found && snap.occupied);
        assert_eq!(
            snap.expiry,
            Expiry::At(Utc.with_ymd_and_hms(2025, 1, 1, 0, 10, 0).unwrap())
        );
    }

    #[test]
    fn other_states_are_available() {
        let snap = snapshot(r#"[{"id": 7, "estado": "disponible", "tiempo_limite": null}]"#);
        assert_eq!(snap, StatusSnapshot::available());

        let snap = snapshot(r#"[{"id": 7}]"#);
        assert_eq!(snap, StatusSnapshot::available());
    }

    #[test]
    fn occupied_without_deadline_keeps_missing_expiry() {
        let snap = snapshot(r#"[{"id": 7, "estado": "ocupada", "tiempo_limite": null}]"#);
        assert_eq!(snap, StatusSnapshot::occupied(Expiry::Missing));
    }

    #[test]
    fn garbage_deadline_is_unparseable() {
        let snap = snapshot(r#"[{"id": 7, "estado": "ocupada", "tiempo_limite": "soon"}]"#);
        assert_eq!(snap.expiry, Expiry::Unparseable("soon".into()));
    }

    #[test]
    fn non_array_body_is_a_decode_error() {
        let err = decode_records(r#"{"message": "nope"}"#).unwrap_err();
        assert!(matches!(err, AuthorityError::Decode(_)));
    }
}
