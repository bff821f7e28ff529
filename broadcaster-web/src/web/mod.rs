// 浏览器端 HTTP 接口

pub mod handlers;
pub mod routes;
pub mod server;
pub mod sse;

pub use handlers::AppState;
pub use server::WebServer;
