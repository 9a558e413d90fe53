pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_USERNAME_LENGTH: usize = 5;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_PERSON_NAME_LENGTH: usize = 150;
pub const MIN_PERSON_NAME_LENGTH: usize = 2;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_SLUG_LENGTH: usize = 50;

/// Usernames that collide with routes under `/api/users/`.
pub const RESERVED_USERNAMES: &[&str] = &[
    "me",
    "set_password",
    "subscriptions",
    "subscribers",
    "subscribe",
];

pub const SHOPPING_LIST_HEADER: &str = "Shopping list:";

/// Recipe images arrive inline as base64 data URLs.
pub const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;
