//! Classification of verification backend responses into display scenarios.
//!
//! A structured `code` on the error payload is preferred when it names one of
//! the [`Scenario`] wire names. Otherwise the human-readable message is
//! matched against known substrings. Anything unrecognized degrades to
//! [`Scenario::NoFaceData`] with the message kept verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::profile::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Success,
    AlreadyArrived,
    MedicalRecordFound,
    TooLate,
    TooEarly,
    NoFaceData,
    NoAppointments,
    NoMedicalRecord,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Success => "success",
            Scenario::AlreadyArrived => "already_arrived",
            Scenario::MedicalRecordFound => "medical_record_found",
            Scenario::TooLate => "too_late",
            Scenario::TooEarly => "too_early",
            Scenario::NoFaceData => "no_face_data",
            Scenario::NoAppointments => "no_appointments",
            Scenario::NoMedicalRecord => "no_medical_record",
        }
    }

    /// Failure scenario named by a structured backend error code.
    pub fn from_error_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "already_arrived" => Some(Scenario::AlreadyArrived),
            "too_late" => Some(Scenario::TooLate),
            "too_early" => Some(Scenario::TooEarly),
            "no_face_data" => Some(Scenario::NoFaceData),
            "no_appointments" => Some(Scenario::NoAppointments),
            "no_medical_record" => Some(Scenario::NoMedicalRecord),
            _ => None,
        }
    }
}

/// Known message fragments, checked in order. Matching is case-insensitive.
const MESSAGE_PATTERNS: &[(&[&str], Scenario)] = &[
    (
        &["already marked as arrived", "already checked in"],
        Scenario::AlreadyArrived,
    ),
    (&["no-show", "window has passed"], Scenario::TooLate),
    (&["more than 1 hour away", "not yet open"], Scenario::TooEarly),
    (&["no medical record"], Scenario::NoMedicalRecord),
    (&["no registered face", "not found"], Scenario::NoFaceData),
    (&["no appointments scheduled"], Scenario::NoAppointments),
];

fn scenario_from_message(message: &str) -> Option<Scenario> {
    let lower = message.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, scenario)| *scenario)
}

/// Successful `verifyArrival` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalVerification {
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub patient: Option<Value>,
    #[serde(default)]
    pub appointment: Option<Value>,
    #[serde(default)]
    pub already_checked_in: bool,
    #[serde(default)]
    pub notification_sent: bool,
}

/// Successful `lookupMedicalRecords` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecordLookup {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub patient: Option<Value>,
    #[serde(default)]
    pub medical_records: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResponse {
    Arrival(ArrivalVerification),
    MedicalRecords(MedicalRecordLookup),
}

/// Structured error payload, or a transport failure rendered as a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub patient: Option<Value>,
    #[serde(default)]
    pub appointment: Option<Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl BackendFailure {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Terminal result of a capture session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub scenario: Scenario,
    pub status: OutcomeStatus,
    pub confidence: f64,
    /// Whether the backend recognized the subject, even on an error response.
    pub is_match: bool,
    pub patient: Option<Value>,
    pub appointment: Option<Value>,
    pub medical_records: Option<Value>,
    pub notification_sent: bool,
    pub message: String,
}

/// Map a verification result to its scenario. Never fails.
pub fn classify(mode: Mode, result: Result<VerificationResponse, BackendFailure>) -> Outcome {
    match result {
        Ok(VerificationResponse::Arrival(arrival)) => classify_arrival(arrival),
        Ok(VerificationResponse::MedicalRecords(lookup)) => classify_lookup(lookup),
        Err(failure) => classify_failure(mode, failure),
    }
}

fn classify_arrival(arrival: ArrivalVerification) -> Outcome {
    let (scenario, message) = if arrival.already_checked_in {
        (
            Scenario::AlreadyArrived,
            "You have already checked in for this appointment.",
        )
    } else {
        (
            Scenario::Success,
            "Check-in successful! Patient marked as arrived.",
        )
    };
    Outcome {
        scenario,
        status: OutcomeStatus::Success,
        confidence: arrival.confidence,
        is_match: true,
        patient: arrival.patient,
        appointment: arrival.appointment,
        medical_records: None,
        notification_sent: arrival.notification_sent,
        message: message.to_string(),
    }
}

fn classify_lookup(lookup: MedicalRecordLookup) -> Outcome {
    if !lookup.success {
        return Outcome {
            scenario: Scenario::NoMedicalRecord,
            status: OutcomeStatus::Error,
            confidence: 0.0,
            is_match: lookup.patient.is_some(),
            patient: lookup.patient,
            appointment: None,
            medical_records: None,
            notification_sent: false,
            message: "No medical records available for this patient.".to_string(),
        };
    }
    Outcome {
        scenario: Scenario::MedicalRecordFound,
        status: OutcomeStatus::Success,
        confidence: 0.0,
        is_match: true,
        patient: lookup.patient,
        appointment: None,
        medical_records: lookup.medical_records,
        notification_sent: false,
        message: "Medical records retrieved.".to_string(),
    }
}

fn classify_failure(mode: Mode, failure: BackendFailure) -> Outcome {
    let by_code = failure.code.as_deref().and_then(Scenario::from_error_code);
    let scenario = by_code
        .or_else(|| scenario_from_message(&failure.message))
        .unwrap_or(Scenario::NoFaceData);

    tracing::info!(
        %mode,
        scenario = scenario.as_str(),
        structured = by_code.is_some(),
        message = %failure.message,
        "verification failure classified"
    );

    let message = if failure.message.is_empty() {
        "Verification failed. Please try again.".to_string()
    } else {
        failure.message
    };

    Outcome {
        scenario,
        status: OutcomeStatus::Error,
        confidence: failure.confidence.unwrap_or(0.0),
        is_match: failure.patient.is_some(),
        patient: failure.patient,
        appointment: failure.appointment,
        medical_records: None,
        notification_sent: false,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fail(message: &str) -> Outcome {
        classify(
            Mode::AppointmentCheckIn,
            Err(BackendFailure::from_message(message)),
        )
    }

    #[test]
    fn test_success_and_already_checked_in() {
        let ok = classify(
            Mode::AppointmentCheckIn,
            Ok(VerificationResponse::Arrival(ArrivalVerification {
                confidence: 0.93,
                patient: Some(json!({"name": "A. Patient"})),
                ..Default::default()
            })),
        );
        assert_eq!(ok.scenario, Scenario::Success);
        assert_eq!(ok.status, OutcomeStatus::Success);
        assert!(ok.is_match);

        let again = classify(
            Mode::AppointmentCheckIn,
            Ok(VerificationResponse::Arrival(ArrivalVerification {
                already_checked_in: true,
                ..Default::default()
            })),
        );
        assert_eq!(again.scenario, Scenario::AlreadyArrived);
        assert_eq!(again.status, OutcomeStatus::Success);
    }

    #[test]
    fn test_lookup_success() {
        let out = classify(
            Mode::EmergencyLookup,
            Ok(VerificationResponse::MedicalRecords(MedicalRecordLookup {
                success: true,
                patient: Some(json!({"id": 7})),
                medical_records: Some(json!([{"id": 1}])),
            })),
        );
        assert_eq!(out.scenario, Scenario::MedicalRecordFound);
        assert!(out.medical_records.is_some());
    }

    #[test]
    fn test_message_patterns() {
        assert_eq!(
            fail("Patient already checked in today").scenario,
            Scenario::AlreadyArrived
        );
        assert_eq!(
            fail("Appointment already marked as arrived").scenario,
            Scenario::AlreadyArrived
        );
        assert_eq!(fail("Marked as No-Show").scenario, Scenario::TooLate);
        assert_eq!(fail("Check-in window has passed").scenario, Scenario::TooLate);
        assert_eq!(
            fail("Appointment is more than 1 hour away").scenario,
            Scenario::TooEarly
        );
        assert_eq!(fail("Check-in is not yet open").scenario, Scenario::TooEarly);
        assert_eq!(
            fail("No appointments scheduled for today").scenario,
            Scenario::NoAppointments
        );
        assert_eq!(fail("No registered face data").scenario, Scenario::NoFaceData);
        assert_eq!(
            fail("No medical records on file").scenario,
            Scenario::NoMedicalRecord
        );
    }

    #[test]
    fn test_unknown_error_degrades_to_no_face_data() {
        let out = fail("connection reset by peer");
        assert_eq!(out.scenario, Scenario::NoFaceData);
        assert_eq!(out.status, OutcomeStatus::Error);
        assert_eq!(out.message, "connection reset by peer");
        assert!(!out.is_match);
    }

    #[test]
    fn test_structured_code_wins_over_message() {
        let out = classify(
            Mode::AppointmentCheckIn,
            Err(BackendFailure {
                message: "Patient not found".to_string(),
                code: Some("TOO_EARLY".to_string()),
                ..Default::default()
            }),
        );
        assert_eq!(out.scenario, Scenario::TooEarly);
    }

    #[test]
    fn test_unknown_code_falls_back_to_message() {
        let out = classify(
            Mode::AppointmentCheckIn,
            Err(BackendFailure {
                message: "already checked in".to_string(),
                code: Some("E4091".to_string()),
                ..Default::default()
            }),
        );
        assert_eq!(out.scenario, Scenario::AlreadyArrived);
    }

    #[test]
    fn test_error_payload_keeps_patient_and_confidence() {
        let out = classify(
            Mode::AppointmentCheckIn,
            Err(BackendFailure {
                message: "window has passed".to_string(),
                patient: Some(json!({"id": 3})),
                confidence: Some(0.88),
                ..Default::default()
            }),
        );
        assert!(out.is_match);
        assert_eq!(out.confidence, 0.88);
    }

    #[test]
    fn test_failure_payload_deserializes() {
        let failure: BackendFailure =
            serde_json::from_value(json!({"message": "No-Show", "confidence": 0.7})).unwrap();
        assert_eq!(failure.confidence, Some(0.7));
        assert!(failure.code.is_none());
    }
}
