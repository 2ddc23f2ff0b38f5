//! Class membership checks shared by the class, book and chapter services

use crate::models::{ClassRecord, Role, User};
use crate::services::error::{AppError, AppResult};

/// Teachers may act on classes they own, students on the class they joined.
pub fn check_class_access(user: &User, class: &ClassRecord) -> AppResult<()> {
    let allowed = match user.role {
        Role::Teacher => class.teacher_id == user.id,
        Role::Student => user.class_id == Some(class.id),
    };
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden("You do not have access to this class".into()))
    }
}

pub fn require_teacher(user: &User) -> AppResult<()> {
    match user.role {
        Role::Teacher => Ok(()),
        Role::Student => Err(AppError::Forbidden("Only teachers can do this".into())),
    }
}
