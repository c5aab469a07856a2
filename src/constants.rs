pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_TAG_COLOR: &str = "#FFFF00";

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_LIFETIME_HOURS: i64 = 1;

pub const SHOPPING_LIST_HEADER: &str = "Shopping list from";
pub const SHOPPING_LIST_TIME_FORMAT: &str = "%d.%m.%Y, %H:%M";

pub const TRUTHY_FLAGS: &[&str] = &["1", "true"];
pub const FALSY_FLAGS: &[&str] = &["0", "false"];
