//! Classes: creation with join codes, student enrollment and rosters

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::constants::{CLASS_CODE_ALPHABET, CLASS_CODE_ATTEMPTS, CLASS_CODE_LEN};
use crate::domain::books::{self, BookSummary};
use crate::domain::classes::{self, ClassSummary};
use crate::domain::users;
use crate::models::{ClassRecord, Role, User};
use crate::services::access::{check_class_access, require_teacher};
use crate::services::auth::{AuthResponse, AuthService, create_account};
use crate::services::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct CreateClassRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinClassRequest {
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetails {
    #[serde(flatten)]
    pub class: ClassRecord,
    pub students: Vec<User>,
    pub books: Vec<BookSummary>,
}

/// What `GET /classes/my-classes` returns for each role
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MyClasses {
    Teacher(Vec<ClassSummary>),
    Student(Option<ClassRecord>),
}

/// Random join code drawn from the class code alphabet.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CLASS_CODE_LEN)
        .map(|_| CLASS_CODE_ALPHABET[rng.random_range(0..CLASS_CODE_ALPHABET.len())] as char)
        .collect()
}

pub struct ClassService {
    db: PgPool,
}

impl ClassService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn user(&self, user_id: Uuid) -> AppResult<User> {
        users::find_by_id(&self.db, user_id)
            .await?
            .ok_or(AppError::NotFound("User"))
    }

    async fn unused_code(&self) -> AppResult<String> {
        for _ in 0..CLASS_CODE_ATTEMPTS {
            // ThreadRng is not Send; keep it out of the await
            let code = generate_code(&mut rand::rng());
            if !classes::code_exists(&self.db, &code).await? {
                return Ok(code);
            }
        }
        Err(AppError::Conflict("Could not allocate a unique class code".into()))
    }

    pub async fn create(&self, teacher_id: Uuid, req: CreateClassRequest) -> AppResult<ClassRecord> {
        let teacher = self.user(teacher_id).await?;
        require_teacher(&teacher)?;

        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Class name is required".into()));
        }
        let description = req.description.as_deref().map(str::trim).filter(|d| !d.is_empty());

        let code = self.unused_code().await?;
        let class = classes::create_class(&self.db, name, description, &code, teacher.id).await?;
        tracing::info!(class_id = %class.id, teacher_id = %teacher.id, "Created class");
        Ok(class)
    }

    /// Register a student account inside the class with the given code.
    pub async fn join(&self, auth: &AuthService, req: JoinClassRequest) -> AppResult<AuthResponse> {
        let code = req.code.trim().to_ascii_uppercase();
        let class = classes::find_by_code(&self.db, &code)
            .await?
            .ok_or(AppError::NotFound("Class"))?;

        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err(AppError::Validation("First and last name are required".into()));
        }

        let student = create_account(
            &self.db,
            &req.email,
            &req.password,
            Some(&req.first_name),
            Some(&req.last_name),
            Role::Student,
            Some(class.id),
        )
        .await?;

        tracing::info!(class_id = %class.id, user_id = %student.id, "Student joined class");
        auth.issue(student)
    }

    pub async fn my_classes(&self, user_id: Uuid) -> AppResult<MyClasses> {
        let user = self.user(user_id).await?;
        match user.role {
            Role::Teacher => Ok(MyClasses::Teacher(
                classes::list_for_teacher(&self.db, user.id).await?,
            )),
            Role::Student => Ok(MyClasses::Student(self.student_class(&user).await?)),
        }
    }

    pub async fn student_class(&self, student: &User) -> AppResult<Option<ClassRecord>> {
        match student.class_id {
            Some(class_id) => Ok(classes::find_by_id(&self.db, class_id).await?),
            None => Ok(None),
        }
    }

    pub async fn details(&self, class_id: Uuid, user_id: Uuid) -> AppResult<ClassDetails> {
        let user = self.user(user_id).await?;
        let class = classes::find_by_id(&self.db, class_id)
            .await?
            .ok_or(AppError::NotFound("Class"))?;
        check_class_access(&user, &class)?;

        let students = users::list_students(&self.db, class.id).await?;
        let books = books::list_for_class(&self.db, class.id).await?;
        Ok(ClassDetails {
            class,
            students,
            books,
        })
    }
}
