use serde::{Deserialize, Serialize};

/// Which kind of assessment an attempt belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AssessmentKind {
    Exam,
    Quiz,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentKind::Exam => "exam",
            AssessmentKind::Quiz => "quiz",
        }
    }
}

/// The assessment a recording or report is attributed to. Exactly one
/// identifier reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssessmentTarget {
    Exam(String),
    Quiz(String),
}

impl AssessmentTarget {
    /// Builds a target from the optional ids a command payload carries.
    /// Returns `None` when neither is present; the exam id wins when both are.
    pub fn from_ids(exam_id: Option<String>, quiz_id: Option<String>) -> Option<Self> {
        match (exam_id, quiz_id) {
            (Some(exam), _) => Some(AssessmentTarget::Exam(exam)),
            (None, Some(quiz)) => Some(AssessmentTarget::Quiz(quiz)),
            (None, None) => None,
        }
    }

    pub fn kind(&self) -> AssessmentKind {
        match self {
            AssessmentTarget::Exam(_) => AssessmentKind::Exam,
            AssessmentTarget::Quiz(_) => AssessmentKind::Quiz,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            AssessmentTarget::Exam(id) | AssessmentTarget::Quiz(id) => id,
        }
    }
}

/// Everything the detector and reporter need to know about the running
/// attempt. Owned by the detector for the lifetime of one attempt.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub target: AssessmentTarget,
    pub created_by: Option<String>,
    pub teacher_owner_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_requires_at_least_one_id() {
        assert_eq!(AssessmentTarget::from_ids(None, None), None);
    }

    #[test]
    fn exam_id_wins_when_both_supplied() {
        let target = AssessmentTarget::from_ids(Some("e1".into()), Some("q1".into()));
        assert_eq!(target, Some(AssessmentTarget::Exam("e1".into())));
    }

    #[test]
    fn quiz_target_carries_its_id() {
        let target = AssessmentTarget::from_ids(None, Some("q1".into())).expect("target");
        assert_eq!(target.kind(), AssessmentKind::Quiz);
        assert_eq!(target.id(), "q1");
    }
}
