pub mod prelude;

pub mod api_keys;
pub mod users;
