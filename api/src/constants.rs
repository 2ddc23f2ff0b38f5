//! Application constants

/// Document bytes one model request may carry inline. The request is capped
/// at 20 MB and base64 grows the payload by a third.
pub const MAX_INLINE_DOCUMENT_SIZE: usize = 14 * 1024 * 1024;

/// Largest book file accepted. The whole book is sent inline for segmentation.
pub const MAX_BOOK_FILE_SIZE: usize = MAX_INLINE_DOCUMENT_SIZE;

/// Request body limit for uploads: the file plus the other multipart fields
pub const MAX_BOOK_UPLOAD_SIZE: usize = MAX_BOOK_FILE_SIZE + 1024 * 1024;

/// Questions generated for a chapter test when the caller does not say
pub const DEFAULT_QUESTION_COUNT: u32 = 5;

/// Upper bound accepted for `numberOfQuestions`
pub const MAX_QUESTION_COUNT: u32 = 50;

/// Class join codes are drawn from this alphabet
pub const CLASS_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a class join code
pub const CLASS_CODE_LEN: usize = 20;

/// Attempts at finding an unused class code before giving up
pub const CLASS_CODE_ATTEMPTS: usize = 10;

/// Access token lifetime (hours)
pub const ACCESS_TOKEN_EXPIRY_HOURS: i64 = 24;

/// Minimum password length for new accounts
pub const MIN_PASSWORD_LEN: usize = 8;

pub const PDF_MIME: &str = "application/pdf";
pub const WAV_MIME: &str = "audio/wav";
