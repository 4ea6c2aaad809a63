use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BodyReading {
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub bmi: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PressureReading {
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub sys: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub dia: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OxygenReading {
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub spo2: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SugarReading {
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub sugar: Option<f64>,
}

/// Payload of the backend's `getMyTimeline` action. Series keep the order the
/// backend delivered them in.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    #[serde(default)]
    pub weight_bmi: Vec<BodyReading>,
    #[serde(default)]
    pub blood_pressure: Vec<PressureReading>,
    #[serde(default)]
    pub o2: Vec<OxygenReading>,
    #[serde(default)]
    pub sugar: Vec<SugarReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Good,
    Warning,
    Danger,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityVerdict {
    pub status: Status,
    pub label: String,
}

impl QualityVerdict {
    pub fn new(status: Status, label: impl Into<String>) -> Self {
        Self {
            status,
            label: label.into(),
        }
    }

    pub fn neutral() -> Self {
        Self::new(Status::Neutral, "-")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Good,
    Warning,
    Danger,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub icon: &'static str,
    pub title: &'static str,
    pub text: &'static str,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Averages {
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub sys: Option<f64>,
    pub dia: Option<f64>,
    pub spo2: Option<f64>,
    pub sugar: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageLabels {
    pub weight: String,
    pub height: String,
    pub bmi: String,
    pub blood_pressure: String,
    pub spo2: String,
    pub sugar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdicts {
    pub weight: QualityVerdict,
    pub height: QualityVerdict,
    pub bmi: QualityVerdict,
    pub blood_pressure: QualityVerdict,
    pub spo2: QualityVerdict,
    pub sugar: QualityVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub averages: Averages,
    pub display: AverageLabels,
    pub verdicts: Verdicts,
    pub recommendations: Vec<Recommendation>,
}

// The spreadsheet backend sends numbers, numeric strings, "" or null for the
// same column depending on how the cell was filled in.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(value)) => Some(value),
        Some(Raw::Text(text)) => text.trim().parse::<f64>().ok(),
        None => None,
    })
}
