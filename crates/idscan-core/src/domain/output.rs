//! Task-specific detector outputs.

use serde::{Deserialize, Serialize};

use super::{CameraProperties, Detection};

/// Document classes recognized by the document detector, in model output order.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentClass {
    /// Passport data page.
    Passport,
    /// Front of an ID card or driving licence.
    IdCardFront,
    /// Back of an ID card or driving licence.
    IdCardBack,
    /// Something document-shaped that is not an accepted document.
    Invalid,
}

impl DocumentClass {
    /// Every class, indexed by its position in the `classes` tensor.
    pub const ALL: [Self; 4] = [
        Self::Passport,
        Self::IdCardFront,
        Self::IdCardBack,
        Self::Invalid,
    ];
}

/// Result of running the document detector on one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetectorOutput {
    /// The best document detection, if any cleared the thresholds.
    pub document: Option<DocumentDetection>,
}

/// A detected document and its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetection {
    /// Location and confidence in frame coordinates.
    pub detection: Detection,
    /// Highest-scoring document class.
    pub classification: DocumentClass,
    /// Score of every class, in [`DocumentClass::ALL`] order.
    pub all_class_scores: Vec<(DocumentClass, f32)>,
}

/// Result of running the face detector on one frame.
///
/// At most two faces are reported, which is enough to tell "no face",
/// "one face" and "multiple faces" apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceDetectorOutput {
    /// Detected faces, highest score first.
    pub faces: Vec<Detection>,
}

impl FaceDetectorOutput {
    /// Number of faces found.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// A detector output paired with the camera state of the frame it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameScan<T> {
    /// What the detector found.
    pub output: T,
    /// Camera state when the frame was submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraProperties>,
}
