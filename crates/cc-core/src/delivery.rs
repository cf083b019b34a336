use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::ReportCategory;

/// Body of the complaint-creation call made for one queued report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ReportCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub client_reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote rejected report with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not build delivery request: {0}")]
    Build(String),
}

impl DeliveryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            DeliveryError::Transport(_) | DeliveryError::Build(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Transport(_) => "transport",
            DeliveryError::Status { .. } => "status",
            DeliveryError::Build(_) => "build",
        }
    }
}
