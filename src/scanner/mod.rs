pub mod cms;
pub mod dns;
pub mod http;
pub mod normalize;
pub mod stealth;
pub mod tls;

pub use http::HttpProber;
pub use stealth::StealthScheduler;
