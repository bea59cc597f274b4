pub mod app;

pub use app::{duration_from_str_int, is_local_env, AppConfig, HttpConfig};
