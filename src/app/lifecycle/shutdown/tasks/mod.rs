pub mod observability;
pub mod review_pool;
pub mod stop_server;
