use crate::error::{DispatchError, IntakeError};
use crate::types::{GeoPoint, RequestStatus, Urgency};

const MAX_PHONE_LEN: usize = 20;
const MAX_NOTE_LEN: usize = 2000;

pub fn validate_coordinates(point: &GeoPoint) -> Result<(), IntakeError> {
    let lat_ok = point.lat.is_finite() && (-90.0..=90.0).contains(&point.lat);
    let lng_ok = point.lng.is_finite() && (-180.0..=180.0).contains(&point.lng);
    if lat_ok && lng_ok {
        Ok(())
    } else {
        Err(IntakeError::InvalidCoordinates {
            lat: point.lat,
            lng: point.lng,
        })
    }
}

/// Returns the phone in canonical form: an optional leading `+` followed by
/// digits only. Spaces and dashes are accepted on input and dropped, so one
/// number always maps to one rate-limit key.
pub fn validate_phone(phone: &str) -> Result<String, IntakeError> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(IntakeError::InvalidInput {
            message: "contact phone is required".to_string(),
        });
    }
    if phone.len() > MAX_PHONE_LEN {
        return Err(IntakeError::InvalidInput {
            message: format!("contact phone longer than {MAX_PHONE_LEN} characters"),
        });
    }
    let (plus, rest) = match phone.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", phone),
    };
    if !rest
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
    {
        return Err(IntakeError::InvalidInput {
            message: "contact phone may only contain digits, spaces, dashes and a leading +"
                .to_string(),
        });
    }
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(IntakeError::InvalidInput {
            message: "contact phone has no digits".to_string(),
        });
    }
    Ok(format!("{plus}{digits}"))
}

pub fn validate_address(address: &str) -> Result<String, IntakeError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(IntakeError::InvalidInput {
            message: "address is required".to_string(),
        });
    }
    Ok(address.to_string())
}

pub fn parse_urgency(value: Option<&str>) -> Result<Urgency, IntakeError> {
    match value {
        None => Ok(Urgency::default()),
        Some(raw) => raw.parse().map_err(|value| IntakeError::InvalidUrgency { value }),
    }
}

pub fn normalize_note(note: Option<String>) -> Result<Option<String>, DispatchError> {
    let Some(note) = note else {
        return Ok(None);
    };
    let note = note.trim();
    if note.is_empty() {
        return Ok(None);
    }
    if note.len() > MAX_NOTE_LEN {
        return Err(DispatchError::InvalidInput {
            message: format!("note longer than {MAX_NOTE_LEN} characters"),
        });
    }
    Ok(Some(note.to_string()))
}

/// Same-state moves are accepted so settled operations can be repeated.
pub fn validate_status_transition(
    from: RequestStatus,
    to: RequestStatus,
) -> Result<(), DispatchError> {
    use RequestStatus::{
        Accepted, Cancelled, DeclinedAll, Dispatched, Escalated, Open, Queued, Resolved,
    };

    if from == to {
        return Ok(());
    }

    let valid = match (from, to) {
        (Open, Queued) => true,
        (Queued, Dispatched) => true,
        (Queued, Escalated) => true,
        (Dispatched, Accepted) => true,
        (Dispatched, DeclinedAll) => true,
        (Dispatched, Escalated) => true,
        (Open, Escalated) => true,
        (DeclinedAll, Escalated) => true,
        (from, Resolved | Cancelled) => !from.is_terminal(),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(DispatchError::InvalidTransition { from, to })
    }
}
