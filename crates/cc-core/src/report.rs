use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::delivery::DeliveryRequest;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReportValidationError {
    #[error("report title must not be blank")]
    BlankTitle,
    #[error("report description must not be blank")]
    BlankDescription,
    #[error("unknown report category: {0}")]
    UnknownCategory(String),
    #[error("coordinates must be finite numbers")]
    NonFiniteCoordinate,
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportCategory {
    CyberCrime,
    CivicIssue,
    Other,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::CyberCrime => "CYBER_CRIME",
            ReportCategory::CivicIssue => "CIVIC_ISSUE",
            ReportCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportCategory {
    type Err = ReportValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_uppercase().replace('-', "_");
        match normalized.as_str() {
            "CYBER_CRIME" | "CYBERCRIME" => Ok(ReportCategory::CyberCrime),
            "CIVIC_ISSUE" | "CIVIC" => Ok(ReportCategory::CivicIssue),
            "OTHER" => Ok(ReportCategory::Other),
            _ => Err(ReportValidationError::UnknownCategory(input.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ReportValidationError> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<(), ReportValidationError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(ReportValidationError::NonFiniteCoordinate);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ReportValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ReportValidationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }
}

/// A complaint as submitted by the page layer, before the store assigns it an
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReport {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Option<ReportCategory>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl NewReport {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: None,
            subcategory: None,
            location: None,
        }
    }

    pub fn with_category(mut self, category: ReportCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    pub fn validate(&self) -> Result<(), ReportValidationError> {
        if self.title.trim().is_empty() {
            return Err(ReportValidationError::BlankTitle);
        }
        if self.description.trim().is_empty() {
            return Err(ReportValidationError::BlankDescription);
        }
        if let Some(location) = &self.location {
            location.validate()?;
        }
        Ok(())
    }

    /// Subcategory with surrounding whitespace removed; blank values collapse
    /// to `None`.
    pub fn normalized_subcategory(&self) -> Option<String> {
        self.subcategory
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingReport {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Option<ReportCategory>,
    pub subcategory: Option<String>,
    pub location: Option<GeoPoint>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl PendingReport {
    pub fn delivery_request(&self) -> DeliveryRequest {
        DeliveryRequest {
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category,
            subcategory: self.subcategory.clone(),
            latitude: self.location.map(|point| point.latitude),
            longitude: self.location.map(|point| point.longitude),
            client_reference: self.idempotency_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pending(location: Option<GeoPoint>) -> PendingReport {
        PendingReport {
            id: 7,
            title: "Pothole".to_string(),
            description: "Large pothole on Main St".to_string(),
            category: Some(ReportCategory::CivicIssue),
            subcategory: Some("POTHOLE".to_string()),
            location,
            idempotency_key: "key-7".to_string(),
            created_at: Utc
                .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn category_parsing_accepts_form_values_and_variants() {
        assert_eq!(
            "CIVIC_ISSUE".parse::<ReportCategory>().unwrap(),
            ReportCategory::CivicIssue
        );
        assert_eq!(
            "cyber-crime".parse::<ReportCategory>().unwrap(),
            ReportCategory::CyberCrime
        );
        assert_eq!(
            " other ".parse::<ReportCategory>().unwrap(),
            ReportCategory::Other
        );
        assert!(matches!(
            "FLOOD".parse::<ReportCategory>(),
            Err(ReportValidationError::UnknownCategory(value)) if value == "FLOOD"
        ));
    }

    #[test]
    fn category_serializes_in_screaming_snake_case() {
        let json = serde_json::to_string(&ReportCategory::CyberCrime).unwrap();
        assert_eq!(json, "\"CYBER_CRIME\"");
        for category in [
            ReportCategory::CyberCrime,
            ReportCategory::CivicIssue,
            ReportCategory::Other,
        ] {
            assert_eq!(category.as_str().parse::<ReportCategory>().unwrap(), category);
        }
    }

    #[test]
    fn validation_rejects_blank_fields() {
        assert_eq!(
            NewReport::new("  ", "desc").validate(),
            Err(ReportValidationError::BlankTitle)
        );
        assert_eq!(
            NewReport::new("title", "\n").validate(),
            Err(ReportValidationError::BlankDescription)
        );
        assert!(NewReport::new("title", "desc").validate().is_ok());
    }

    #[test]
    fn geo_point_bounds_are_enforced() {
        assert!(GeoPoint::new(28.61, 77.20).is_ok());
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(ReportValidationError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, -180.5),
            Err(ReportValidationError::LongitudeOutOfRange(-180.5))
        );
        assert_eq!(
            GeoPoint::new(f64::NAN, 0.0),
            Err(ReportValidationError::NonFiniteCoordinate)
        );

        let report = NewReport::new("t", "d").with_location(GeoPoint {
            latitude: 0.0,
            longitude: 400.0,
        });
        assert_eq!(
            report.validate(),
            Err(ReportValidationError::LongitudeOutOfRange(400.0))
        );
    }

    #[test]
    fn blank_subcategory_normalizes_to_none() {
        let report = NewReport::new("t", "d").with_subcategory("   ");
        assert_eq!(report.normalized_subcategory(), None);
        let report = NewReport::new("t", "d").with_subcategory(" GARBAGE ");
        assert_eq!(report.normalized_subcategory().as_deref(), Some("GARBAGE"));
    }

    #[test]
    fn delivery_request_carries_report_fields_and_reference() {
        let report = pending(Some(GeoPoint {
            latitude: 12.5,
            longitude: 77.25,
        }));
        let request = report.delivery_request();
        assert_eq!(request.title, "Pothole");
        assert_eq!(request.category, Some(ReportCategory::CivicIssue));
        assert_eq!(request.latitude, Some(12.5));
        assert_eq!(request.longitude, Some(77.25));
        assert_eq!(request.client_reference, "key-7");

        let without_location = pending(None).delivery_request();
        assert_eq!(without_location.latitude, None);
        assert_eq!(without_location.longitude, None);
    }
}
