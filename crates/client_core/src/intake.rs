use std::fmt;

use tracing::warn;

use crate::{config::DEFAULT_MAX_FILES, source_file::SourceFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    NotPdf,
    TooManyFiles { max_files: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub name: String,
    pub reason: RejectionReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            RejectionReason::NotPdf => write!(f, "{} is not a PDF file", self.name),
            RejectionReason::TooManyFiles { max_files } => write!(
                f,
                "{} was skipped: maximum {max_files} files per upload",
                self.name
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct Intake {
    pub accepted: Vec<SourceFile>,
    pub rejected: Vec<Rejection>,
}

/// Screens candidate files before they reach the tracker.
#[derive(Debug, Clone, Copy)]
pub struct IntakePolicy {
    max_files: usize,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILES)
    }
}

impl IntakePolicy {
    pub fn new(max_files: usize) -> Self {
        Self { max_files }
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Files declaring a non-PDF type are rejected; files with no declared
    /// type are let through. Accepted files beyond `max_files` are rejected.
    pub fn screen(&self, files: impl IntoIterator<Item = SourceFile>) -> Intake {
        let mut intake = Intake::default();
        for file in files {
            let declares_other_type = file
                .content_type()
                .is_some_and(|ct| !ct.is_empty() && !ct.to_ascii_lowercase().contains("pdf"));

            let reason = if declares_other_type {
                Some(RejectionReason::NotPdf)
            } else if intake.accepted.len() >= self.max_files {
                Some(RejectionReason::TooManyFiles {
                    max_files: self.max_files,
                })
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    let rejection = Rejection {
                        name: file.name().to_string(),
                        reason,
                    };
                    warn!(file = file.name(), "{rejection}");
                    intake.rejected.push(rejection);
                }
                None => intake.accepted.push(file),
            }
        }
        intake
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: Option<&str>) -> SourceFile {
        SourceFile::from_bytes(name, content_type, &b"data"[..])
    }

    #[test]
    fn rejects_declared_non_pdf_types() {
        let intake = IntakePolicy::default().screen(vec![
            file("policy.pdf", Some("application/pdf")),
            file("photo.png", Some("image/png")),
            file("unknown", None),
        ]);

        let accepted: Vec<_> = intake.accepted.iter().map(|f| f.name()).collect();
        assert_eq!(accepted, vec!["policy.pdf", "unknown"]);
        assert_eq!(intake.rejected.len(), 1);
        assert_eq!(intake.rejected[0].to_string(), "photo.png is not a PDF file");
    }

    #[test]
    fn caps_accepted_files_at_maximum() {
        let intake = IntakePolicy::new(2).screen(vec![
            file("a.pdf", Some("application/pdf")),
            file("b.pdf", Some("application/x-pdf")),
            file("c.pdf", Some("application/pdf")),
        ]);

        assert_eq!(intake.accepted.len(), 2);
        assert_eq!(
            intake.rejected,
            vec![Rejection {
                name: "c.pdf".into(),
                reason: RejectionReason::TooManyFiles { max_files: 2 },
            }]
        );
    }
}
