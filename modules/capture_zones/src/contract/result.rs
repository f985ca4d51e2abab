//! Uniform result envelope returned by every mutating operation

use super::error::CaptureZonesError;
use super::model::DataValue;
use indexmap::IndexMap;

/// Outcome of a mutating API call.
///
/// `data` keeps insertion order and is empty when no auxiliary fields apply.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureZonesActionResult {
    pub success: bool,
    pub message: String,
    pub data: IndexMap<String, DataValue>,
}

impl CaptureZonesActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: IndexMap::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: IndexMap::new(),
        }
    }

    /// Append an auxiliary data field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.data.get(key)
    }
}

impl From<CaptureZonesError> for CaptureZonesActionResult {
    fn from(error: CaptureZonesError) -> Self {
        let mut result = Self::failed(error.to_string()).with("error", error.code());
        match &error {
            CaptureZonesError::NotFound { resource, id } => {
                result = result.with("resource", resource.as_str()).with("id", id.as_str());
            }
            CaptureZonesError::DuplicateId { id } => {
                result = result.with("id", id.as_str());
            }
            CaptureZonesError::SchemaMismatch { path, .. }
            | CaptureZonesError::UnknownPath { path } => {
                result = result.with("path", path.as_str());
            }
            _ => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_maps_to_failed_result() {
        let result: CaptureZonesActionResult = CaptureZonesError::zone_not_found("A1").into();

        assert!(!result.success);
        assert_eq!(result.get("error"), Some(&DataValue::from("not_found")));
        assert_eq!(result.get("id"), Some(&DataValue::from("A1")));
        assert_eq!(result.message, "zone not found: A1");
    }

    #[test]
    fn test_data_keeps_insertion_order() {
        let result = CaptureZonesActionResult::ok("done")
            .with("zeta", 1usize)
            .with("alpha", true);

        let keys: Vec<&String> = result.data.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }
}
