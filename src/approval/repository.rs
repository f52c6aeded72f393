use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::error::ApprovalError;
use super::model::{
    AcademicTerm, ApprovalKey, ClassLevel, Student, StudentGrade, SubjectAssignment, TeacherRef,
};

/// Read port onto the grading subsystem's data.
pub trait GradeRepository {
    fn find_class_level(&self, class_level_id: &str) -> Result<Option<ClassLevel>, ApprovalError>;

    fn find_term(&self, term_id: &str) -> Result<Option<AcademicTerm>, ApprovalError>;

    /// The term grades are currently being recorded for in the class level's school.
    fn current_term(&self, class_level_id: &str) -> Result<Option<AcademicTerm>, ApprovalError>;

    fn find_grade(
        &self,
        student_id: &str,
        subject_id: &str,
        term_id: &str,
    ) -> Result<Option<StudentGrade>, ApprovalError>;

    fn list_grades(&self, key: &ApprovalKey) -> Result<Vec<StudentGrade>, ApprovalError>;

    /// Class level the student belongs to for the term.
    fn find_enrollment(
        &self,
        student_id: &str,
        term_id: &str,
    ) -> Result<Option<String>, ApprovalError>;

    fn list_roster(&self, key: &ApprovalKey) -> Result<Vec<Student>, ApprovalError>;

    fn list_subject_assignments(
        &self,
        key: &ApprovalKey,
    ) -> Result<Vec<SubjectAssignment>, ApprovalError>;
}

/// Checks that both halves of the key exist and belong to the same school.
pub fn resolve_key<R: GradeRepository + ?Sized>(
    repo: &R,
    key: &ApprovalKey,
) -> Result<(ClassLevel, AcademicTerm), ApprovalError> {
    let class_level = repo
        .find_class_level(&key.class_level_id)?
        .ok_or_else(|| ApprovalError::not_found("class level", &key.class_level_id))?;
    let term = repo
        .find_term(&key.academic_term_id)?
        .filter(|t| t.school_id == class_level.school_id)
        .ok_or_else(|| ApprovalError::not_found("academic term", &key.academic_term_id))?;
    Ok((class_level, term))
}

/// Builds the key for a class level, falling back to the current term when none is given.
pub fn key_for_class_level<R: GradeRepository + ?Sized>(
    repo: &R,
    class_level_id: &str,
    academic_term_id: Option<&str>,
) -> Result<ApprovalKey, ApprovalError> {
    if let Some(term_id) = academic_term_id {
        return Ok(ApprovalKey::new(class_level_id, term_id));
    }
    if repo.find_class_level(class_level_id)?.is_none() {
        return Err(ApprovalError::not_found("class level", class_level_id));
    }
    let term = repo
        .current_term(class_level_id)?
        .ok_or_else(|| ApprovalError::not_found("current academic term", class_level_id))?;
    Ok(ApprovalKey::new(class_level_id, term.id))
}

pub struct SqliteGradeRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteGradeRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Returns true when a new row was created.
    ///
    /// An existing row keeps its class level; a row recorded under another class level
    /// is never rewritten here and yields `Conflict`.
    pub fn upsert_grade(&self, grade: &StudentGrade, now: &str) -> Result<bool, ApprovalError> {
        let existed = self
            .find_grade(&grade.student_id, &grade.subject_id, &grade.academic_term_id)?
            .is_some();
        let grade_id = Uuid::new_v4().to_string();
        let changed = self.conn.execute(
            "INSERT INTO student_grades(id, student_id, subject_id, class_level_id, academic_term_id, score, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, academic_term_id) DO UPDATE SET
               score = excluded.score,
               updated_at = excluded.updated_at
             WHERE student_grades.class_level_id = excluded.class_level_id",
            (
                &grade_id,
                &grade.student_id,
                &grade.subject_id,
                &grade.class_level_id,
                &grade.academic_term_id,
                grade.score,
                now,
            ),
        )?;
        if changed == 0 {
            return Err(ApprovalError::Conflict(
                "grade is recorded under another class level".to_string(),
            ));
        }
        Ok(!existed)
    }

    /// Scoped to `key`; rows owned by another class level are left alone.
    pub fn delete_grade(
        &self,
        key: &ApprovalKey,
        student_id: &str,
        subject_id: &str,
    ) -> Result<bool, ApprovalError> {
        let n = self.conn.execute(
            "DELETE FROM student_grades
             WHERE student_id = ? AND subject_id = ?
               AND class_level_id = ? AND academic_term_id = ?",
            (student_id, subject_id, &key.class_level_id, &key.academic_term_id),
        )?;
        Ok(n > 0)
    }

    pub fn is_subject_assigned(
        &self,
        key: &ApprovalKey,
        subject_id: &str,
    ) -> Result<bool, ApprovalError> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM subject_assignments
                 WHERE class_level_id = ? AND academic_term_id = ? AND subject_id = ?",
                (&key.class_level_id, &key.academic_term_id, subject_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }
}

fn term_from_row(row: &Row<'_>) -> rusqlite::Result<AcademicTerm> {
    Ok(AcademicTerm {
        id: row.get(0)?,
        school_id: row.get(1)?,
        academic_year: row.get(2)?,
        ordinal: row.get(3)?,
        name: row.get(4)?,
        is_current: row.get::<_, i64>(5)? != 0,
    })
}

fn grade_from_row(row: &Row<'_>) -> rusqlite::Result<StudentGrade> {
    Ok(StudentGrade {
        student_id: row.get(0)?,
        subject_id: row.get(1)?,
        class_level_id: row.get(2)?,
        academic_term_id: row.get(3)?,
        score: row.get(4)?,
    })
}

impl GradeRepository for SqliteGradeRepository<'_> {
    fn find_class_level(&self, class_level_id: &str) -> Result<Option<ClassLevel>, ApprovalError> {
        let v = self
            .conn
            .query_row(
                "SELECT id, school_id, name FROM class_levels WHERE id = ?",
                [class_level_id],
                |r| {
                    Ok(ClassLevel {
                        id: r.get(0)?,
                        school_id: r.get(1)?,
                        name: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(v)
    }

    fn find_term(&self, term_id: &str) -> Result<Option<AcademicTerm>, ApprovalError> {
        let v = self
            .conn
            .query_row(
                "SELECT id, school_id, academic_year, ordinal, name, is_current
                 FROM academic_terms WHERE id = ?",
                [term_id],
                term_from_row,
            )
            .optional()?;
        Ok(v)
    }

    fn current_term(&self, class_level_id: &str) -> Result<Option<AcademicTerm>, ApprovalError> {
        // Flagged term first, otherwise the latest one the school has.
        let v = self
            .conn
            .query_row(
                "SELECT t.id, t.school_id, t.academic_year, t.ordinal, t.name, t.is_current
                 FROM academic_terms t
                 JOIN class_levels c ON c.school_id = t.school_id
                 WHERE c.id = ?
                 ORDER BY t.is_current DESC, t.academic_year DESC, t.ordinal DESC
                 LIMIT 1",
                [class_level_id],
                term_from_row,
            )
            .optional()?;
        Ok(v)
    }

    fn find_grade(
        &self,
        student_id: &str,
        subject_id: &str,
        term_id: &str,
    ) -> Result<Option<StudentGrade>, ApprovalError> {
        let v = self
            .conn
            .query_row(
                "SELECT student_id, subject_id, class_level_id, academic_term_id, score
                 FROM student_grades
                 WHERE student_id = ? AND subject_id = ? AND academic_term_id = ?",
                (student_id, subject_id, term_id),
                grade_from_row,
            )
            .optional()?;
        Ok(v)
    }

    fn list_grades(&self, key: &ApprovalKey) -> Result<Vec<StudentGrade>, ApprovalError> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, subject_id, class_level_id, academic_term_id, score
             FROM student_grades
             WHERE class_level_id = ? AND academic_term_id = ?",
        )?;
        let rows = stmt
            .query_map((&key.class_level_id, &key.academic_term_id), grade_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_enrollment(
        &self,
        student_id: &str,
        term_id: &str,
    ) -> Result<Option<String>, ApprovalError> {
        let enrolled: Option<String> = self
            .conn
            .query_row(
                "SELECT class_level_id FROM enrollments
                 WHERE student_id = ? AND academic_term_id = ?",
                (student_id, term_id),
                |r| r.get(0),
            )
            .optional()?;
        if enrolled.is_some() {
            return Ok(enrolled);
        }

        // Students recorded before enrollments existed only appear through their grades.
        let graded: Option<String> = self
            .conn
            .query_row(
                "SELECT class_level_id FROM student_grades
                 WHERE student_id = ? AND academic_term_id = ?
                 ORDER BY updated_at DESC
                 LIMIT 1",
                (student_id, term_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(graded)
    }

    fn list_roster(&self, key: &ApprovalKey) -> Result<Vec<Student>, ApprovalError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.first_name, s.last_name
             FROM enrollments e
             JOIN students s ON s.id = e.student_id
             WHERE e.class_level_id = ? AND e.academic_term_id = ?
             ORDER BY s.last_name, s.first_name, s.id",
        )?;
        let rows = stmt
            .query_map((&key.class_level_id, &key.academic_term_id), |r| {
                Ok(Student {
                    id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_subject_assignments(
        &self,
        key: &ApprovalKey,
    ) -> Result<Vec<SubjectAssignment>, ApprovalError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.subject_id, a.subject_name, t.id, t.first_name, t.last_name
             FROM subject_assignments a
             LEFT JOIN teachers t ON t.id = a.teacher_id
             WHERE a.class_level_id = ? AND a.academic_term_id = ?
             ORDER BY a.subject_name, a.subject_id",
        )?;
        let rows = stmt
            .query_map((&key.class_level_id, &key.academic_term_id), |r| {
                let teacher_id: Option<String> = r.get(2)?;
                let teacher = match teacher_id {
                    Some(id) => Some(TeacherRef {
                        id,
                        first_name: r.get(3)?,
                        last_name: r.get(4)?,
                    }),
                    None => None,
                };
                Ok(SubjectAssignment {
                    subject_id: r.get(0)?,
                    subject_name: r.get(1)?,
                    teacher,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
