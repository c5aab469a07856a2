mod database {
    pub mod actions;
    pub mod error;
    pub mod filter;
    pub mod form;
    pub mod pagination;
    pub mod schema;
}
mod authentication {
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod services {
    pub mod shopping_list;
    pub mod toggle;
    pub mod validation;
}
mod config;
mod constants;
mod routes;
mod state;

mod cache {
    pub mod cache;
}

pub use authentication::*;
pub use cache::cache::*;
pub use config::*;
pub use constants::*;
pub use database::*;
pub use routes::*;
pub use services::*;
pub use state::*;
