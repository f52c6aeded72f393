use std::fmt;

use serde_json::json;
use thiserror::Error;

use super::model::{ActorRole, LockTier};

/// Why a mutation or transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    AdminLocked,
    TeacherLocked,
    UnresolvedClassLevel,
    AdminLockHeld,
    ForceApproveDisabled,
}

impl ForbiddenReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::AdminLocked => "results are administrator-locked; contact the school administrator",
            Self::TeacherLocked => {
                "results are teacher-approved; contact the school administrator to unlock"
            }
            Self::UnresolvedClassLevel => "cannot determine class level for student and term",
            Self::AdminLockHeld => {
                "results are administrator-locked; only a school administrator can unapprove"
            }
            Self::ForceApproveDisabled => "force approve is disabled for this workspace",
        }
    }

    pub fn lock_tier(self) -> Option<LockTier> {
        match self {
            Self::AdminLocked | Self::AdminLockHeld => Some(LockTier::SchoolAdmin),
            Self::TeacherLocked => Some(LockTier::Teacher),
            Self::UnresolvedClassLevel | Self::ForceApproveDisabled => None,
        }
    }

    /// Who can lift the condition, when someone can.
    pub fn clearable_by(self) -> Option<ActorRole> {
        self.lock_tier().map(|_| ActorRole::SchoolAdmin)
    }
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Forbidden(ForbiddenReason),
    #[error("{0}")]
    Conflict(String),
    #[error("scan covers {cells} student/subject pairs, limit is {limit}")]
    ResourceExceeded { cells: usize, limit: usize },
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

impl ApprovalError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::ResourceExceeded { .. } => "resource_exceeded",
            Self::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            Self::Forbidden(reason) => Some(json!({
                "lockTier": reason.lock_tier().map(LockTier::as_str),
                "clearableBy": reason.clearable_by().map(ActorRole::as_str),
            })),
            Self::ResourceExceeded { cells, limit } => {
                Some(json!({ "cells": cells, "limit": limit }))
            }
            Self::Validation(_) | Self::Conflict(_) | Self::Storage(_) => None,
        }
    }
}
