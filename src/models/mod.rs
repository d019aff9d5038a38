mod session;
mod subscription;
mod webhook_event;

pub use session::*;
pub use subscription::*;
pub use webhook_event::*;
