use serde::Serialize;

/// Composite key of an approval record: one class level for one academic term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalKey {
    pub class_level_id: String,
    pub academic_term_id: String,
}

impl ApprovalKey {
    pub fn new(class_level_id: impl Into<String>, academic_term_id: impl Into<String>) -> Self {
        Self {
            class_level_id: class_level_id.into(),
            academic_term_id: academic_term_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassLevel {
    pub id: String,
    pub school_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcademicTerm {
    pub id: String,
    pub school_id: String,
    pub academic_year: String,
    pub ordinal: i64,
    pub name: String,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRef {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

/// Which teacher answers for a subject in one class level and term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAssignment {
    pub subject_id: String,
    pub subject_name: String,
    pub teacher: Option<TeacherRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentGrade {
    pub student_id: String,
    pub subject_id: String,
    pub class_level_id: String,
    pub academic_term_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingSubject {
    pub subject_id: String,
    pub subject_name: String,
    pub teacher: Option<TeacherRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMissingGrades {
    pub student: Student,
    pub missing_subjects: Vec<MissingSubject>,
}

/// Students with at least one ungraded subject, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MissingGradesReport {
    pub students: Vec<StudentMissingGrades>,
}

impl MissingGradesReport {
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.students.iter().map(|s| s.missing_subjects.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalState {
    Open,
    TeacherApproved,
    AdminApproved,
}

impl ApprovalState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::TeacherApproved => "teacherApproved",
            Self::AdminApproved => "adminApproved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LockTier {
    Teacher,
    SchoolAdmin,
}

impl LockTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::SchoolAdmin => "schoolAdmin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub class_level_id: String,
    pub academic_term_id: String,
    pub teacher_approved: bool,
    pub school_admin_approved: bool,
    /// Stamped by every successful transition, unapprovals included; the event log
    /// tells which action it was.
    pub approved_at: Option<String>,
    pub approved_by: Option<String>,
    pub updated_at: Option<String>,
}

impl ApprovalRecord {
    /// The state of a key that has never been approved.
    pub fn open(key: &ApprovalKey) -> Self {
        Self {
            class_level_id: key.class_level_id.clone(),
            academic_term_id: key.academic_term_id.clone(),
            teacher_approved: false,
            school_admin_approved: false,
            approved_at: None,
            approved_by: None,
            updated_at: None,
        }
    }

    pub fn state(&self) -> ApprovalState {
        if self.school_admin_approved {
            ApprovalState::AdminApproved
        } else if self.teacher_approved {
            ApprovalState::TeacherApproved
        } else {
            ApprovalState::Open
        }
    }

    /// The strongest lock currently held, if any.
    pub fn lock_tier(&self) -> Option<LockTier> {
        match self.state() {
            ApprovalState::Open => None,
            ApprovalState::TeacherApproved => Some(LockTier::Teacher),
            ApprovalState::AdminApproved => Some(LockTier::SchoolAdmin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorRole {
    Teacher,
    SchoolAdmin,
}

impl ActorRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "teacher" => Some(Self::Teacher),
            "schoolAdmin" | "school_admin" => Some(Self::SchoolAdmin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::SchoolAdmin => "schoolAdmin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub role: ActorRole,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalAction {
    Approve,
    Unapprove,
}

impl ApprovalAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "unapprove" => Some(Self::Unapprove),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Unapprove => "unapprove",
        }
    }
}

/// Input to the mutation guard, built by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockKey {
    ClassTerm(ApprovalKey),
    StudentTerm { student_id: String, term_id: String },
}

/// One row of the append-only approval log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    pub id: String,
    pub actor_role: String,
    pub actor_id: String,
    pub action: String,
    pub forced: bool,
    pub teacher_approved: bool,
    pub school_admin_approved: bool,
    pub occurred_at: String,
}
