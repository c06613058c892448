mod client;
mod common;
mod slot;

pub mod prelude {
    pub use crate::client::{HttpClientInstrumented, HttpResponse};
    pub use crate::common::http_get;
    pub use crate::slot::HttpSlot;
}
