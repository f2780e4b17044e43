use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(RecordId, u64);
id_newtype!(DocumentId, String);

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Content type accepted by the classification endpoint.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStatus {
    Processing,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, UploadStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Processing => "Processing",
            UploadStatus::Completed => "Completed",
            UploadStatus::Error => "Error",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationInfo {
    pub classification: &'static str,
    pub description: &'static str,
}

/// Labels the classification service can assign, in display order.
pub const CLASSIFICATIONS: &[ClassificationInfo] = &[
    ClassificationInfo {
        classification: "Application",
        description: "Insurance applications and forms",
    },
    ClassificationInfo {
        classification: "Audit",
        description: "Premium audit reports and worksheets",
    },
    ClassificationInfo {
        classification: "Certificate",
        description: "Certificates of insurance",
    },
    ClassificationInfo {
        classification: "Endorsement",
        description: "Policy endorsements and amendments",
    },
    ClassificationInfo {
        classification: "Invoice",
        description: "Premium invoices and billing statements",
    },
    ClassificationInfo {
        classification: "Loss Run",
        description: "Historical claims data and loss experience",
    },
    ClassificationInfo {
        classification: "Other",
        description: "Any other insurance-related document",
    },
    ClassificationInfo {
        classification: "Policy",
        description: "Insurance policy documents and contracts",
    },
    ClassificationInfo {
        classification: "Quote",
        description: "Insurance quotes and proposals",
    },
];

pub fn find_classification(label: &str) -> Option<&'static ClassificationInfo> {
    CLASSIFICATIONS
        .iter()
        .find(|info| info.classification.eq_ignore_ascii_case(label.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_processing_is_non_terminal() {
        assert!(!UploadStatus::Processing.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Error.is_terminal());
    }

    #[test]
    fn finds_classification_ignoring_case_and_padding() {
        let info = find_classification("  loss run ").expect("known label");
        assert_eq!(info.classification, "Loss Run");
        assert!(find_classification("Receipt").is_none());
    }

    #[test]
    fn record_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&RecordId(42)).expect("serialize");
        assert_eq!(json, "42");
    }
}
