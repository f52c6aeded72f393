use std::collections::HashSet;

use super::error::ApprovalError;
use super::model::{
    ApprovalKey, MissingGradesReport, MissingSubject, Student, StudentMissingGrades,
    SubjectAssignment,
};
use super::repository::{resolve_key, GradeRepository};

pub const DEFAULT_SCAN_MAX_CELLS: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Upper bound on roster size times subject count.
    pub max_cells: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_cells: DEFAULT_SCAN_MAX_CELLS,
        }
    }
}

/// Lists every (student, subject) pair of the class level and term that has no grade.
///
/// The result is a snapshot; grades entered while the scan runs may or may not be seen.
pub fn scan<R: GradeRepository + ?Sized>(
    repo: &R,
    key: &ApprovalKey,
    limits: ScanLimits,
) -> Result<MissingGradesReport, ApprovalError> {
    resolve_key(repo, key)?;

    let roster = repo.list_roster(key)?;
    let subjects = repo.list_subject_assignments(key)?;

    let cells = roster.len().saturating_mul(subjects.len());
    if cells > limits.max_cells {
        return Err(ApprovalError::ResourceExceeded {
            cells,
            limit: limits.max_cells,
        });
    }
    if cells == 0 {
        return Ok(MissingGradesReport::default());
    }

    let graded: HashSet<(String, String)> = repo
        .list_grades(key)?
        .into_iter()
        .map(|g| (g.student_id, g.subject_id))
        .collect();

    let report = missing_grades(&roster, &subjects, &graded);
    tracing::debug!(
        class_level_id = %key.class_level_id,
        academic_term_id = %key.academic_term_id,
        cells,
        students = report.students.len(),
        missing = report.missing_count(),
        "missing-grade scan"
    );
    Ok(report)
}

/// Cross product of roster and subjects minus the graded pairs.
pub fn missing_grades(
    roster: &[Student],
    subjects: &[SubjectAssignment],
    graded: &HashSet<(String, String)>,
) -> MissingGradesReport {
    let mut students = Vec::new();
    for student in roster {
        let missing_subjects: Vec<MissingSubject> = subjects
            .iter()
            .filter(|a| !graded.contains(&(student.id.clone(), a.subject_id.clone())))
            .map(|a| MissingSubject {
                subject_id: a.subject_id.clone(),
                subject_name: a.subject_name.clone(),
                teacher: a.teacher.clone(),
            })
            .collect();
        if !missing_subjects.is_empty() {
            students.push(StudentMissingGrades {
                student: student.clone(),
                missing_subjects,
            });
        }
    }
    MissingGradesReport { students }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::approval::model::{AcademicTerm, ClassLevel, StudentGrade, TeacherRef};
    use std::cell::Cell;

    /// In-memory stand-in for the grading subsystem.
    #[derive(Default)]
    pub(crate) struct FakeRepo {
        pub roster: Vec<Student>,
        pub subjects: Vec<SubjectAssignment>,
        pub grades: Vec<StudentGrade>,
        pub enrollments: Vec<(String, String, String)>,
        pub grade_reads: Cell<usize>,
    }

    impl FakeRepo {
        pub fn student(id: &str, first: &str, last: &str) -> Student {
            Student {
                id: id.into(),
                first_name: first.into(),
                last_name: last.into(),
            }
        }

        pub fn subject(id: &str, name: &str, teacher: &str) -> SubjectAssignment {
            SubjectAssignment {
                subject_id: id.into(),
                subject_name: name.into(),
                teacher: Some(TeacherRef {
                    id: teacher.into(),
                    first_name: teacher.into(),
                    last_name: "Teacher".into(),
                }),
            }
        }

        pub fn grade(&mut self, student_id: &str, subject_id: &str) {
            self.grades.push(StudentGrade {
                student_id: student_id.into(),
                subject_id: subject_id.into(),
                class_level_id: "c1".into(),
                academic_term_id: "t1".into(),
                score: 70.0,
            });
        }

        /// S1 and S2 taking Math (T1) and Eng (T2); only S1 has a Math grade.
        pub fn two_by_two() -> Self {
            let mut repo = FakeRepo {
                roster: vec![
                    Self::student("S1", "Ada", "Bello"),
                    Self::student("S2", "Chidi", "Okafor"),
                ],
                subjects: vec![
                    Self::subject("math", "Math", "T1"),
                    Self::subject("eng", "Eng", "T2"),
                ],
                ..Default::default()
            };
            repo.grade("S1", "math");
            repo
        }
    }

    impl GradeRepository for FakeRepo {
        fn find_class_level(&self, id: &str) -> Result<Option<ClassLevel>, ApprovalError> {
            Ok((id == "c1").then(|| ClassLevel {
                id: id.into(),
                school_id: "sch1".into(),
                name: "JSS 1".into(),
            }))
        }

        fn find_term(&self, id: &str) -> Result<Option<AcademicTerm>, ApprovalError> {
            Ok((id == "t1").then(|| AcademicTerm {
                id: id.into(),
                school_id: "sch1".into(),
                academic_year: "2025/2026".into(),
                ordinal: 1,
                name: "First Term".into(),
                is_current: true,
            }))
        }

        fn current_term(&self, class_level_id: &str) -> Result<Option<AcademicTerm>, ApprovalError> {
            if class_level_id == "c1" {
                self.find_term("t1")
            } else {
                Ok(None)
            }
        }

        fn find_grade(
            &self,
            student_id: &str,
            subject_id: &str,
            _term_id: &str,
        ) -> Result<Option<StudentGrade>, ApprovalError> {
            Ok(self
                .grades
                .iter()
                .find(|g| g.student_id == student_id && g.subject_id == subject_id)
                .cloned())
        }

        fn list_grades(&self, _key: &ApprovalKey) -> Result<Vec<StudentGrade>, ApprovalError> {
            self.grade_reads.set(self.grade_reads.get() + 1);
            Ok(self.grades.clone())
        }

        fn find_enrollment(
            &self,
            student_id: &str,
            term_id: &str,
        ) -> Result<Option<String>, ApprovalError> {
            Ok(self
                .enrollments
                .iter()
                .find(|(s, t, _)| s == student_id && t == term_id)
                .map(|(_, _, c)| c.clone()))
        }

        fn list_roster(&self, _key: &ApprovalKey) -> Result<Vec<Student>, ApprovalError> {
            Ok(self.roster.clone())
        }

        fn list_subject_assignments(
            &self,
            _key: &ApprovalKey,
        ) -> Result<Vec<SubjectAssignment>, ApprovalError> {
            Ok(self.subjects.clone())
        }
    }

    fn key() -> ApprovalKey {
        ApprovalKey::new("c1", "t1")
    }

    #[test]
    fn reports_exactly_the_ungraded_pairs() {
        let repo = FakeRepo::two_by_two();
        let report = scan(&repo, &key(), ScanLimits::default()).expect("scan");

        assert_eq!(report.students.len(), 2);
        assert_eq!(report.students[0].student.id, "S1");
        let s1: Vec<_> = report.students[0]
            .missing_subjects
            .iter()
            .map(|m| (m.subject_name.as_str(), m.teacher.as_ref().map(|t| t.id.as_str())))
            .collect();
        assert_eq!(s1, vec![("Eng", Some("T2"))]);

        assert_eq!(report.students[1].student.id, "S2");
        let s2: Vec<_> = report.students[1]
            .missing_subjects
            .iter()
            .map(|m| (m.subject_name.as_str(), m.teacher.as_ref().map(|t| t.id.as_str())))
            .collect();
        assert_eq!(s2, vec![("Math", Some("T1")), ("Eng", Some("T2"))]);
        assert_eq!(report.missing_count(), 3);
    }

    #[test]
    fn fully_graded_class_is_complete() {
        let mut repo = FakeRepo::two_by_two();
        repo.grade("S1", "eng");
        repo.grade("S2", "math");
        repo.grade("S2", "eng");
        let report = scan(&repo, &key(), ScanLimits::default()).expect("scan");
        assert!(report.is_empty());
    }

    #[test]
    fn grades_for_unassigned_subjects_do_not_hide_gaps() {
        let mut repo = FakeRepo::two_by_two();
        repo.grade("S2", "art");
        let report = scan(&repo, &key(), ScanLimits::default()).expect("scan");
        assert_eq!(report.missing_count(), 3);
    }

    #[test]
    fn oversized_scan_fails_before_reading_grades() {
        let repo = FakeRepo::two_by_two();
        let err = scan(&repo, &key(), ScanLimits { max_cells: 3 }).unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::ResourceExceeded { cells: 4, limit: 3 }
        ));
        assert_eq!(repo.grade_reads.get(), 0);
    }

    #[test]
    fn unknown_class_level_or_term_is_not_found() {
        let repo = FakeRepo::two_by_two();
        let err = scan(&repo, &ApprovalKey::new("nope", "t1"), ScanLimits::default()).unwrap_err();
        assert!(matches!(err, ApprovalError::NotFound { entity: "class level", .. }));
        let err = scan(&repo, &ApprovalKey::new("c1", "nope"), ScanLimits::default()).unwrap_err();
        assert!(matches!(err, ApprovalError::NotFound { entity: "academic term", .. }));
    }

    #[test]
    fn empty_roster_is_complete() {
        let repo = FakeRepo {
            subjects: vec![FakeRepo::subject("math", "Math", "T1")],
            ..Default::default()
        };
        let report = scan(&repo, &key(), ScanLimits::default()).expect("scan");
        assert!(report.is_empty());
    }
}
